//! Harvest coordinator - run-level orchestration
//!
//! A run prunes expired cache entries, opens a run record, walks every seed
//! group (several at a time), downloads each group's candidates through the
//! shared scheduler and closes the run record with the summary.

use crate::cache::{IncrementalCache, RunStatus, SqliteCache};
use crate::config::Config;
use crate::crawler::discovery::DiscoveryEngine;
use crate::crawler::render::{RenderSession, RendererFactory, SessionGuard};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scheduler::DownloadScheduler;
use crate::crawler::{HttpFetcher, PageFetcher, RateLimiter};
use crate::output::{GroupReport, RunSummary};
use crate::robots::RobotsCache;
use crate::state::SeedGroup;
use crate::store::{ArtifactStore, LocalStore};
use crate::HarvestError;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runs seed groups end to end against one cache, limiter and store
pub struct Harvester {
    config: Arc<Config>,
    cache: IncrementalCache,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ArtifactStore>,
    renderer_factory: Option<Arc<dyn RendererFactory>>,
}

impl Harvester {
    /// Opens the configured SQLite cache and local artifact directory
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let sqlite = SqliteCache::new(Path::new(&config.cache.database_path))?;
        let cache = IncrementalCache::new(
            Arc::new(sqlite),
            config.cache.freshness(),
            config.cache.retention(),
        );
        let fetcher = HttpFetcher::new(&config.user_agent)?;
        let store = LocalStore::new(config.storage.local_path.clone());

        Ok(Self::with_parts(
            config,
            cache,
            Arc::new(fetcher),
            Arc::new(store),
        ))
    }

    /// Builds a harvester from already constructed capabilities
    pub fn with_parts(
        config: Config,
        cache: IncrementalCache,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.crawler.request_delay()));
        Self {
            config: Arc::new(config),
            cache,
            limiter,
            fetcher,
            store,
            renderer_factory: None,
        }
    }

    /// Supplies the render capability used when rendering is enabled
    pub fn with_renderer_factory(mut self, factory: Arc<dyn RendererFactory>) -> Self {
        self.renderer_factory = Some(factory);
        self
    }

    pub fn cache(&self) -> &IncrementalCache {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Runs every group and returns the aggregate summary
    ///
    /// Per-page and per-download failures end up in the summary; only failures
    /// to open or close the run record are returned as errors.
    pub async fn run(
        &self,
        groups: &[SeedGroup],
        config_hash: &str,
    ) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        let crawler = &self.config.crawler;
        let deadline = crawler.run_deadline().map(|d| started + d);

        match self.cache.prune_expired() {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "pruned expired cache entries"),
            Err(e) => warn!(error = %e, "failed to prune expired cache entries"),
        }

        let run_id = self.cache.start_run(config_hash)?;
        info!(run_id, groups = groups.len(), "starting harvest run");

        let session = SessionGuard::new(Arc::new(match &self.renderer_factory {
            Some(factory) if crawler.enable_rendering => RenderSession::new(Arc::clone(factory)),
            _ => RenderSession::disabled(),
        }));

        let retry = RetryPolicy::from_config(&self.config.retry);

        let mut discovery = DiscoveryEngine::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.limiter),
            self.cache.clone(),
        )
        .with_retry(retry.clone())
        .with_renderer(Arc::clone(session.session()))
        .with_request_timeout(crawler.request_timeout());

        if crawler.respect_robots_txt {
            let robots = RobotsCache::new(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.limiter),
                self.config.user_agent.crawler_name.clone(),
                crawler.probe_timeout(),
            );
            discovery = discovery.with_robots(Arc::new(robots));
        }

        let scheduler = DownloadScheduler::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.limiter),
            self.cache.clone(),
            Arc::clone(&self.store),
        )
        .with_retry(retry)
        .with_timeouts(crawler.probe_timeout(), crawler.request_timeout())
        .with_max_artifact_bytes(crawler.max_artifact_bytes)
        .with_min_artifact_bytes(crawler.min_artifact_bytes)
        .with_organize_by_group(self.config.storage.organize_by_group)
        .with_workers(crawler.max_concurrent_downloads);

        let discovery = &discovery;
        let scheduler = &scheduler;
        let concurrency = crawler.max_concurrent_downloads;

        let mut reports: Vec<(usize, GroupReport)> = stream::iter(groups.iter().enumerate())
            .map(move |(index, group)| async move {
                let report = run_group(discovery, scheduler, group, concurrency, deadline).await;
                (index, report)
            })
            .buffer_unordered(crawler.max_parallel_groups.max(1))
            .collect()
            .await;
        reports.sort_by_key(|(index, _)| *index);

        session.close().await;

        let summary = RunSummary::new(
            Some(run_id),
            reports.into_iter().map(|(_, report)| report).collect(),
            started.elapsed(),
        );
        self.cache.finish_run(run_id, RunStatus::Completed)?;

        info!(
            run_id,
            downloaded = summary.totals.downloaded,
            skipped = summary.totals.skipped_duplicate + summary.totals.skipped_invalid,
            failed = summary.totals.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "harvest run completed"
        );

        Ok(summary)
    }
}

/// Discovers one group and downloads its candidates
async fn run_group(
    discovery: &DiscoveryEngine,
    scheduler: &DownloadScheduler,
    group: &SeedGroup,
    concurrency: usize,
    deadline: Option<Instant>,
) -> GroupReport {
    let started = Instant::now();
    let result = discovery.discover(group, deadline).await;
    info!(
        group = %group.id,
        pages = result.pages_visited,
        candidates = result.candidates.len(),
        stopped = %result.stopped_reason,
        "group walked, dispatching downloads"
    );

    let outcomes: Vec<_> = scheduler
        .schedule(group, result.candidates.clone(), concurrency, deadline)
        .collect()
        .await;

    GroupReport::new(result, outcomes, started.elapsed())
}
