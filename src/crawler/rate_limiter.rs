//! Per-host request spacing
//!
//! Each host gets one gate. Requests to the same host are serialized through
//! its gate and dispatched at least the configured spacing apart; requests to
//! different hosts never wait on each other.

use crate::url::host_key;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

/// Per-host minimum-spacing gate
///
/// Shared across the discovery walks and the download workers of a run, so
/// spacing is scoped to the host and not to whichever group issued the request.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,

    /// Arc so a gate can be cloned out and the map shard released before awaiting
    hosts: DashMap<String, Arc<HostGate>>,
}

#[derive(Debug)]
struct HostGate {
    /// Dispatch instant of the last request; None until the first acquire
    last: Mutex<Option<Instant>>,

    /// Host-specific spacing in milliseconds (never below the global minimum)
    spacing_ms: AtomicU64,
}

impl HostGate {
    fn new(spacing: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            spacing_ms: AtomicU64::new(spacing.as_millis() as u64),
        }
    }

    fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms.load(Ordering::SeqCst))
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        debug!(delay_ms = min_delay.as_millis() as u64, "creating rate limiter");
        Self {
            min_delay,
            hosts: DashMap::new(),
        }
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn gate(&self, host: &str) -> Arc<HostGate> {
        self.hosts
            .entry(host.to_lowercase())
            .or_insert_with(|| Arc::new(HostGate::new(self.min_delay)))
            .clone()
    }

    /// Waits until this host's spacing has elapsed since its last dispatch
    ///
    /// The gate stays locked while waiting, so concurrent callers for the same
    /// host queue up behind each other. The first request to a host proceeds
    /// immediately.
    pub async fn acquire(&self, host: &str) {
        let gate = self.gate(host);
        let mut last = gate.last.lock().await;

        if let Some(previous) = *last {
            let spacing = gate.spacing();
            let elapsed = previous.elapsed();
            if elapsed < spacing {
                let wait = spacing - elapsed;
                trace!(host, wait_ms = wait.as_millis() as u64, "waiting for host gate");
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Acquires the gate for the URL's host (host plus explicit port)
    pub async fn acquire_url(&self, url: &Url) {
        let host = host_key(url).unwrap_or_else(|| "unknown".to_string());
        self.acquire(&host).await;
    }

    /// Raises a host's spacing, e.g. from a robots.txt `Crawl-delay`
    ///
    /// Never lowers it below the current value.
    pub fn raise_spacing(&self, host: &str, spacing: Duration) {
        let gate = self.gate(host);
        let requested = spacing.as_millis() as u64;
        let previous = gate.spacing_ms.fetch_max(requested, Ordering::SeqCst);
        if requested > previous {
            debug!(host, spacing_ms = requested, "raised host spacing");
        }
    }

    /// Current spacing for a host
    pub fn spacing_for(&self, host: &str) -> Duration {
        self.hosts
            .get(&host.to_lowercase())
            .map(|gate| gate.spacing())
            .unwrap_or(self.min_delay)
    }
}
