//! Crawler module for discovery and downloads
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching behind the [`PageFetcher`] capability
//! - Per-host rate limiting and retry with backoff
//! - Breadth-first discovery of document candidates
//! - The download scheduler and run coordination

mod coordinator;
mod discovery;
mod error;
mod fetcher;
mod rate_limiter;
mod render;
mod retry;
mod scheduler;

pub use coordinator::Harvester;
pub use discovery::{DiscoveryEngine, DiscoveryResult, PageError};
pub use error::{FetchError, TaskError};
pub use fetcher::{
    build_http_client, parse_retry_after, DownloadResponse, HttpFetcher, PageFetcher,
    PageResponse, ProbeResponse,
};
pub use rate_limiter::RateLimiter;
pub use render::{PageRenderer, RenderSession, RendererFactory, SessionGuard};
pub use retry::{run_with_retry, FailureKind, RetryDecision, RetryPolicy, Retryable};
pub use scheduler::DownloadScheduler;

use crate::config::Config;
use crate::output::RunSummary;
use crate::state::SeedGroup;
use crate::HarvestError;

/// Runs a complete harvest with the configured cache, fetcher and store
///
/// Convenience entry point for callers that inject no capabilities of their
/// own; see [`Harvester`] for that.
pub async fn harvest(
    config: Config,
    groups: &[SeedGroup],
    config_hash: &str,
) -> Result<RunSummary, HarvestError> {
    Harvester::new(config)?.run(groups, config_hash).await
}
