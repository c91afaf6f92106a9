//! Robots.txt handling module
//!
//! Fetches, parses and caches robots.txt once per host, and feeds any
//! `Crawl-delay` into the rate limiter.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::crawler::{PageFetcher, RateLimiter};
use crate::url::host_key;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

/// Largest robots.txt body read
const MAX_ROBOTS_BYTES: u64 = 512 * 1024;

/// Per-host robots.txt rules for one process
pub struct RobotsCache {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<RateLimiter>,
    agent: String,
    timeout: Duration,
    hosts: DashMap<String, Arc<OnceCell<CachedRobots>>>,
}

impl RobotsCache {
    /// `agent` is the product token matched against `User-agent` lines
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        limiter: Arc<RateLimiter>,
        agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            agent: agent.into(),
            timeout,
            hosts: DashMap::new(),
        }
    }

    /// Checks whether the crawler may fetch `url`
    ///
    /// The host's robots.txt is fetched on first use; concurrent callers for the
    /// same host wait for that single fetch.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        let rules = self.rules_for(url).await;
        rules.content.is_url_allowed(url, &self.agent)
    }

    /// Number of hosts with cached rules
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    async fn rules_for(&self, url: &Url) -> CachedRobots {
        let host = host_key(url).unwrap_or_default();
        let cell = self.cell(&host);

        let cached = cell
            .get_or_init(|| async { CachedRobots::new(self.fetch(url, &host).await) })
            .await
            .clone();

        if cached.is_stale() {
            self.hosts.remove(&host);
            let cell = self.cell(&host);
            return cell
                .get_or_init(|| async { CachedRobots::new(self.fetch(url, &host).await) })
                .await
                .clone();
        }

        cached
    }

    fn cell(&self, host: &str) -> Arc<OnceCell<CachedRobots>> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn fetch(&self, url: &Url, host: &str) -> ParsedRobots {
        let mut robots_url = url.clone();
        robots_url.set_path("/robots.txt");
        robots_url.set_query(None);
        robots_url.set_fragment(None);

        self.limiter.acquire(host).await;
        let rules = match self
            .fetcher
            .fetch_page(&robots_url, self.timeout, MAX_ROBOTS_BYTES)
            .await
        {
            Ok(page) => ParsedRobots::from_content(&page.body),
            Err(e) => {
                debug!(host, error = %e, "robots.txt unavailable, allowing all");
                ParsedRobots::allow_all()
            }
        };

        if let Some(delay) = rules.crawl_delay(&self.agent) {
            info!(host, delay_ms = delay.as_millis() as u64, "honouring crawl-delay");
            self.limiter.raise_spacing(host, delay);
        }

        rules
    }
}
