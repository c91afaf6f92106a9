//! Cache store trait and error types

use crate::cache::{CacheEntry, CacheStats, PageLinkRecord, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt cache row for {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("Cache lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Durable backend of the incremental cache
///
/// Implementations serialize their own access, so every method takes `&self`
/// and the store can be shared behind an `Arc` by concurrent workers.
pub trait CacheStore: Send + Sync {
    // ===== Entries =====

    /// Returns the stored entry for a key, exactly as recorded
    fn lookup(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Inserts or replaces an entry
    ///
    /// A `None` fingerprint, validator or artifact key keeps the stored value, so a
    /// failed re-check never erases what a previous success recorded.
    fn record(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Sets an entry's status and last-checked timestamp; returns false if absent
    fn touch(&self, key: &str, at: DateTime<Utc>) -> CacheResult<bool>;

    /// Deletes entries last checked before the cutoff, with their recorded links
    fn prune(&self, older_than: DateTime<Utc>) -> CacheResult<usize>;

    // ===== Page links =====

    /// Records page entries and replaces their links in one transaction
    fn record_walk(&self, pages: &[(CacheEntry, Vec<PageLinkRecord>)]) -> CacheResult<()>;

    /// Links recorded for a page at the end of its last walk
    fn page_links(&self, page_key: &str) -> CacheResult<Vec<PageLinkRecord>>;

    // ===== Runs =====

    fn create_run(&self, config_hash: &str) -> CacheResult<i64>;

    fn finish_run(&self, run_id: i64, status: RunStatus) -> CacheResult<()>;

    fn get_run(&self, run_id: i64) -> CacheResult<RunRecord>;

    // ===== Statistics =====

    /// Counts entries; entries checked at or after `fresh_since` count as fresh
    fn stats(&self, fresh_since: DateTime<Utc>) -> CacheResult<CacheStats>;
}
