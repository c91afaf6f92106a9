//! Bounded breadth-first discovery over a seed group's pages

use crate::cache::{
    fingerprint, CacheEntry, CacheStatus, IncrementalCache, LinkRole, PageLinkRecord,
};
use crate::classifier::{
    classify_links, content_type_signal, extract_links, extract_sitemap, is_navigable, score,
    DiscoveredLink, PageLinks, Signal, Verdict,
};
use crate::crawler::render::RenderSession;
use crate::crawler::retry::{run_with_retry, RetryPolicy};
use crate::crawler::{FetchError, PageFetcher, PageResponse, RateLimiter};
use crate::robots::RobotsCache;
use crate::state::{Candidate, SeedGroup, StopReason, VisitRecord};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Largest page body scanned for links
const MAX_PAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Most sitemap documents read per seed host, index files included
const MAX_SITEMAPS_PER_HOST: usize = 10;

/// A page branch abandoned during a walk
#[derive(Debug, Clone, PartialEq)]
pub struct PageError {
    pub url: String,
    /// Error kind label (`timeout`, `http-status`, `robots`, ...)
    pub kind: String,
    pub attempts: u32,
    pub message: String,
}

/// Result of walking one seed group
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub group_id: String,

    /// One candidate per normalized URL, in discovery order
    pub candidates: Vec<Candidate>,

    /// Pages fetched from the network (cache replays excluded)
    pub pages_visited: usize,

    /// Pages skipped because their cache entry was fresh
    pub pages_from_cache: usize,

    pub stopped_reason: StopReason,
    pub visits: Vec<VisitRecord>,
    pub errors: Vec<PageError>,
    pub elapsed: Duration,
}

struct Frontier {
    url: Url,
    depth: u32,
    /// Page that linked here; None for seeds
    parent: Option<Url>,
}

/// Mutable state of one walk; never shared between groups
#[derive(Default)]
struct WalkContext {
    visited: HashSet<String>,
    queue: VecDeque<Frontier>,
    candidates: Vec<Candidate>,
    candidate_index: HashMap<String, usize>,
    visits: Vec<VisitRecord>,
    errors: Vec<PageError>,
    recorded: Vec<(CacheEntry, Vec<PageLinkRecord>)>,
    pages_visited: usize,
    pages_from_cache: usize,
}

impl WalkContext {
    /// Queues a page unless it was already seen in this walk
    fn enqueue(&mut self, url: Url, depth: u32, parent: Option<Url>) -> bool {
        if !self.visited.insert(url.as_str().to_string()) {
            return false;
        }
        self.queue.push_back(Frontier { url, depth, parent });
        true
    }

    /// Adds a candidate, keeping the higher-confidence one on duplicates
    fn add_candidate(&mut self, candidate: Candidate) {
        match self.candidate_index.get(candidate.cache_key()) {
            Some(&i) => {
                if candidate.confidence > self.candidates[i].confidence {
                    self.candidates[i] = candidate;
                }
            }
            None => {
                self.candidate_index
                    .insert(candidate.cache_key().to_string(), self.candidates.len());
                self.candidates.push(candidate);
            }
        }
    }

    fn skip(&mut self, url: &Url, kind: &str, attempts: u32, message: String) {
        self.errors.push(PageError {
            url: url.to_string(),
            kind: kind.to_string(),
            attempts,
            message,
        });
    }
}

/// Walks seed groups and collects document candidates
pub struct DiscoveryEngine {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<RateLimiter>,
    cache: IncrementalCache,
    retry: RetryPolicy,
    robots: Option<Arc<RobotsCache>>,
    renderer: Arc<RenderSession>,
    request_timeout: Duration,
}

impl DiscoveryEngine {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        limiter: Arc<RateLimiter>,
        cache: IncrementalCache,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            cache,
            retry: RetryPolicy::default(),
            robots: None,
            renderer: Arc::new(RenderSession::disabled()),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_robots(mut self, robots: Arc<RobotsCache>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<RenderSession>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Walks one seed group breadth-first within its budgets
    ///
    /// Stops at the first dequeued page that would exceed the depth, page or
    /// time budget (or the run `deadline`) and reports which one. Fetch failures
    /// abandon only the failing branch. Pages with a fresh cache entry are not
    /// fetched; the links recorded for them on an earlier walk are replayed.
    ///
    /// With sitemaps enabled, same-site entries of each seed host's sitemap
    /// join the queue at depth 1 before the walk starts.
    #[instrument(skip_all, fields(group = %group.id))]
    pub async fn discover(&self, group: &SeedGroup, deadline: Option<Instant>) -> DiscoveryResult {
        let started = Instant::now();
        let mut ctx = WalkContext::default();

        for seed in &group.seeds {
            ctx.enqueue(seed.clone(), 0, None);
        }
        if group.use_sitemaps && !deadline.is_some_and(|d| Instant::now() >= d) {
            self.seed_from_sitemaps(group, &mut ctx).await;
        }

        let stopped_reason = loop {
            let Some(next) = ctx.queue.pop_front() else {
                break StopReason::Exhausted;
            };
            if next.depth > group.max_depth {
                break StopReason::DepthLimit;
            }
            if ctx.pages_visited >= group.max_pages {
                break StopReason::PageLimit;
            }
            if started.elapsed() >= group.time_limit
                || deadline.is_some_and(|d| Instant::now() >= d)
            {
                break StopReason::TimeLimit;
            }

            self.visit(group, next, &mut ctx).await;
        };

        if let Err(e) = self.cache.record_walk(&ctx.recorded) {
            warn!(error = %e, "failed to persist walk");
        }

        let elapsed = started.elapsed();
        info!(
            pages = ctx.pages_visited,
            from_cache = ctx.pages_from_cache,
            candidates = ctx.candidates.len(),
            skipped = ctx.errors.len(),
            reason = %stopped_reason,
            "discovery finished"
        );

        DiscoveryResult {
            group_id: group.id.clone(),
            candidates: ctx.candidates,
            pages_visited: ctx.pages_visited,
            pages_from_cache: ctx.pages_from_cache,
            stopped_reason,
            visits: ctx.visits,
            errors: ctx.errors,
            elapsed,
        }
    }

    /// Merges the entries of each seed host's sitemap into the walk
    async fn seed_from_sitemaps(&self, group: &SeedGroup, ctx: &mut WalkContext) {
        let mut roots = HashSet::new();
        for seed in &group.seeds {
            let Ok(root) = seed.join("/sitemap.xml") else {
                continue;
            };
            if !roots.insert(root.as_str().to_string()) {
                continue;
            }

            let links: Vec<DiscoveredLink> = self
                .sitemap_links(group, root)
                .await
                .into_iter()
                .filter(|link| Url::parse(&link.url).is_ok_and(|u| group.allows(&u)))
                .collect();
            if links.is_empty() {
                continue;
            }
            info!(seed = %seed, entries = links.len(), "sitemap entries found");

            let origin = Frontier {
                url: seed.clone(),
                depth: 0,
                parent: None,
            };
            self.absorb(group, &origin, classify_links(seed, &links), ctx);
        }
    }

    /// Page entries of a sitemap, following same-site sitemap indexes
    async fn sitemap_links(&self, group: &SeedGroup, root: Url) -> Vec<DiscoveredLink> {
        let mut pending = VecDeque::from([root]);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        while let Some(url) = pending.pop_front() {
            if seen.len() >= MAX_SITEMAPS_PER_HOST {
                break;
            }
            if !seen.insert(url.as_str().to_string()) {
                continue;
            }
            if let Some(robots) = &self.robots {
                if !robots.is_allowed(&url).await {
                    debug!(url = %url, "sitemap disallowed by robots.txt");
                    continue;
                }
            }

            let response = match self.fetch(&url).await {
                (Ok(response), _) => response,
                (Err(e), _) => {
                    debug!(url = %url, error = %e, "no sitemap");
                    continue;
                }
            };
            if !response.is_text() {
                continue;
            }

            let entries = extract_sitemap(&response.body, &response.url);
            debug!(
                url = %url,
                pages = entries.pages.len(),
                nested = entries.nested.len(),
                "sitemap read"
            );
            links.extend(entries.pages);
            pending.extend(entries.nested.into_iter().filter(|u| group.allows(u)));
        }

        links
    }

    async fn visit(&self, group: &SeedGroup, page: Frontier, ctx: &mut WalkContext) {
        let key = page.url.as_str().to_string();

        match self.cache.is_fresh_page(&key) {
            Ok(true) => {
                self.replay(group, &page, ctx);
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(url = %key, error = %e, "cache lookup failed, fetching"),
        }

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&page.url).await {
                info!(url = %key, "disallowed by robots.txt, skipping");
                ctx.skip(&page.url, "robots", 0, "disallowed by robots.txt".to_string());
                return;
            }
        }

        ctx.pages_visited += 1;
        ctx.visits.push(VisitRecord {
            url: page.url.clone(),
            depth: page.depth,
            visited_at: Utc::now(),
            from_cache: false,
        });

        let (result, attempts) = self.fetch(&page.url).await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %key, attempts, error = %e, "page fetch failed, skipping branch");
                ctx.skip(&page.url, e.kind_label(), attempts, e.to_string());
                return;
            }
        };

        // Redirect targets count as visited too
        if response.url != page.url {
            if let Ok(final_url) = crate::url::normalize_url(response.url.as_str()) {
                ctx.visited.insert(final_url.as_str().to_string());
            }
        }

        if !response.is_html() {
            self.leaf(group, &page, &response, ctx);
            return;
        }

        let links = self.links_for(group, &page.url, &response).await;
        let classified = classify_links(&response.url, &links);
        debug!(
            url = %key,
            depth = page.depth,
            links = links.len(),
            candidates = classified.candidates.len(),
            navigable = classified.navigable.len(),
            "page classified"
        );

        let records = link_records(&classified);
        self.absorb(group, &page, classified, ctx);

        ctx.recorded.push((
            CacheEntry::page(&key, Some(fingerprint(response.body.as_bytes())), CacheStatus::Fresh),
            records,
        ));
    }

    async fn fetch(&self, url: &Url) -> (Result<PageResponse, FetchError>, u32) {
        let fetcher = &self.fetcher;
        let limiter = &self.limiter;
        let timeout = self.request_timeout;
        run_with_retry(&self.retry, move |_| async move {
            limiter.acquire_url(url).await;
            fetcher.fetch_page(url, timeout, MAX_PAGE_BYTES).await
        })
        .await
    }

    /// Links of a fetched page, rendered when the page needs script execution
    async fn links_for(
        &self,
        group: &SeedGroup,
        url: &Url,
        response: &PageResponse,
    ) -> Vec<DiscoveredLink> {
        let extracted = extract_links(&response.body, &response.url);
        let needs_render =
            group.flags_render(url) || (extracted.links.is_empty() && extracted.has_script);
        if !needs_render {
            return extracted.links;
        }

        let Some(renderer) = self.renderer.get().await else {
            return extracted.links;
        };

        self.limiter.acquire_url(url).await;
        match renderer.render_page(url, self.request_timeout).await {
            Ok(links) => {
                debug!(url = %url, links = links.len(), "page rendered");
                links
            }
            Err(e) => {
                warn!(url = %url, error = %e, "render failed, using fetched links");
                extracted.links
            }
        }
    }

    /// Handles a non-HTML response reached through a navigable link
    ///
    /// A declared PDF content type turns the page itself into a candidate.
    fn leaf(&self, group: &SeedGroup, page: &Frontier, response: &PageResponse, ctx: &mut WalkContext) {
        let Some(signal @ Signal::ContentType(_)) =
            content_type_signal(response.content_type.as_deref(), None)
        else {
            return;
        };

        let signals = vec![signal];
        let candidate = Candidate {
            source_page: page.parent.clone().unwrap_or_else(|| page.url.clone()),
            url: page.url.clone(),
            link_text: String::new(),
            confidence: score(&signals),
            signals,
            verdict: Verdict::Accepted,
        };
        if candidate.matches_document_types(&group.document_types) {
            debug!(url = %page.url, "non-HTML page declared as PDF");
            ctx.add_candidate(candidate);
        }
    }

    /// Merges one page's classified links into the walk
    fn absorb(&self, group: &SeedGroup, page: &Frontier, links: PageLinks, ctx: &mut WalkContext) {
        for candidate in links.candidates {
            if candidate.matches_document_types(&group.document_types) {
                ctx.add_candidate(candidate);
            }
        }

        for next in links.navigable.into_iter().chain(links.tentative_pages) {
            if group.allows(&next) {
                ctx.enqueue(next, page.depth + 1, Some(page.url.clone()));
            }
        }
    }

    /// Replays the links recorded for a fresh page without network access
    fn replay(&self, group: &SeedGroup, page: &Frontier, ctx: &mut WalkContext) {
        let records = match self.cache.page_links(page.url.as_str()) {
            Ok(records) => records,
            Err(e) => {
                warn!(url = %page.url, error = %e, "failed to load recorded links");
                Vec::new()
            }
        };

        debug!(url = %page.url, links = records.len(), "fresh page, replaying recorded links");
        ctx.pages_from_cache += 1;
        ctx.visits.push(VisitRecord {
            url: page.url.clone(),
            depth: page.depth,
            visited_at: Utc::now(),
            from_cache: true,
        });

        let mut links = PageLinks::default();
        for record in records {
            let Ok(target) = Url::parse(&record.target) else {
                continue;
            };
            match record.role {
                LinkRole::Navigable => links.navigable.push(target),
                LinkRole::Candidate => {
                    let verdict = record.verdict.unwrap_or(Verdict::Tentative);
                    if verdict == Verdict::Tentative && is_navigable(&target) {
                        links.tentative_pages.push(target.clone());
                    }
                    links.candidates.push(Candidate {
                        source_page: page.url.clone(),
                        url: target,
                        link_text: record.link_text,
                        signals: record.signals,
                        confidence: record.confidence,
                        verdict,
                    });
                }
            }
        }

        self.absorb(group, page, links, ctx);
    }
}

/// Links of a page in the form persisted for replay
fn link_records(links: &PageLinks) -> Vec<PageLinkRecord> {
    let candidates = links.candidates.iter().map(|c| PageLinkRecord {
        role: LinkRole::Candidate,
        target: c.url.to_string(),
        link_text: c.link_text.clone(),
        signals: c.signals.clone(),
        confidence: c.confidence,
        verdict: Some(c.verdict),
    });
    let navigable = links.navigable.iter().map(|u| PageLinkRecord {
        role: LinkRole::Navigable,
        target: u.to_string(),
        link_text: String::new(),
        signals: Vec::new(),
        confidence: 0.0,
        verdict: None,
    });
    candidates.chain(navigable).collect()
}
