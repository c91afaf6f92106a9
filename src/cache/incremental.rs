use crate::cache::traits::{CacheResult, CacheStore};
use crate::cache::{CacheEntry, CacheStats, CacheStatus, EntryKind, PageLinkRecord, RunStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The incremental cache seen by the discovery engine and the scheduler
///
/// Wraps a durable [`CacheStore`] with the freshness window, the retention window
/// and the set of resource keys currently claimed by a download task. Cheap to
/// clone; clones share the store and the claim set.
#[derive(Clone)]
pub struct IncrementalCache {
    store: Arc<dyn CacheStore>,
    freshness: Duration,
    retention: Duration,
    in_flight: Arc<DashMap<String, ()>>,
}

/// Exclusive claim on a resource key, released on drop
#[derive(Debug)]
pub struct ClaimGuard {
    key: String,
    in_flight: Arc<DashMap<String, ()>>,
}

impl ClaimGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

impl IncrementalCache {
    /// Creates a cache over `store` with the given freshness and retention windows
    pub fn new(store: Arc<dyn CacheStore>, freshness: Duration, retention: Duration) -> Self {
        Self {
            store,
            freshness,
            retention,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Entries checked at or after this instant are fresh
    pub fn fresh_since(&self) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::seconds(self.freshness.as_secs() as i64)
    }

    /// Looks up an entry, classifying its status against the freshness window
    ///
    /// Entries recorded as fresh become `Stale` once they age out of the window;
    /// `Unknown` entries stay unknown.
    pub fn lookup(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let fresh_since = self.fresh_since();
        Ok(self.store.lookup(key)?.map(|mut entry| {
            if entry.status == CacheStatus::Fresh && entry.last_checked < fresh_since {
                entry.status = CacheStatus::Stale;
            }
            entry
        }))
    }

    /// Returns true when the page was fetched within the freshness window
    pub fn is_fresh_page(&self, key: &str) -> CacheResult<bool> {
        Ok(matches!(
            self.lookup(key)?,
            Some(CacheEntry {
                kind: EntryKind::Page,
                status: CacheStatus::Fresh,
                ..
            })
        ))
    }

    /// Records that a resource was checked now
    pub fn record(
        &self,
        key: &str,
        kind: EntryKind,
        fingerprint: Option<String>,
        status: CacheStatus,
    ) -> CacheResult<()> {
        let entry = match kind {
            EntryKind::Page => CacheEntry::page(key, fingerprint, status),
            EntryKind::Artifact => CacheEntry::artifact(key, fingerprint, status),
        };
        self.store.record(&entry)
    }

    /// Records a fully described entry
    pub fn record_entry(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.store.record(entry)
    }

    /// Marks an entry fresh as of now without changing its fingerprint
    pub fn refresh(&self, key: &str) -> CacheResult<bool> {
        self.store.touch(key, Utc::now())
    }

    /// Deletes entries last checked before `older_than`
    pub fn prune(&self, older_than: DateTime<Utc>) -> CacheResult<usize> {
        let removed = self.store.prune(older_than)?;
        debug!(removed, "pruned cache entries");
        Ok(removed)
    }

    /// Deletes entries older than the retention window
    pub fn prune_expired(&self) -> CacheResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.retention.as_secs() as i64);
        self.prune(cutoff)
    }

    /// Persists the pages of a finished walk and the links found on them
    pub fn record_walk(&self, pages: &[(CacheEntry, Vec<PageLinkRecord>)]) -> CacheResult<()> {
        self.store.record_walk(pages)
    }

    /// Links recorded for a page, for replay while the page is fresh
    pub fn page_links(&self, page_key: &str) -> CacheResult<Vec<PageLinkRecord>> {
        self.store.page_links(page_key)
    }

    /// Claims a resource key for one download task
    ///
    /// Returns None when another task holds the key; the claim is released when
    /// the returned guard is dropped.
    pub fn claim(&self, key: &str) -> Option<ClaimGuard> {
        match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(ClaimGuard {
                    key: key.to_string(),
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn start_run(&self, config_hash: &str) -> CacheResult<i64> {
        self.store.create_run(config_hash)
    }

    pub fn finish_run(&self, run_id: i64, status: RunStatus) -> CacheResult<()> {
        self.store.finish_run(run_id, status)
    }

    pub fn stats(&self) -> CacheResult<CacheStats> {
        self.store.stats(self.fresh_since())
    }
}
