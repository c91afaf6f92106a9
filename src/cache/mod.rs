//! Incremental cache
//!
//! A durable mapping from normalized resource keys to what was last seen there,
//! shared across runs so repeat runs can skip unchanged work:
//! - SQLite persistence of cache entries, recorded page links and runs
//! - freshness classification relative to a configurable age window
//! - retention pruning
//! - at-most-one-in-flight claims per resource key

mod incremental;
mod schema;
mod sqlite;
mod traits;

pub use incremental::{ClaimGuard, IncrementalCache};
pub use sqlite::SqliteCache;
pub use traits::{CacheError, CacheResult, CacheStore};

use crate::classifier::{Signal, Verdict};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// What a cache entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Page,
    Artifact,
}

impl EntryKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Artifact => "artifact",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "page" => Some(Self::Page),
            "artifact" => Some(Self::Artifact),
            _ => None,
        }
    }
}

/// Recency classification of an entry
///
/// Stored entries are written as `Fresh` (successful fetch) or `Unknown` (the
/// last attempt failed); `Stale` is derived on lookup from the entry's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    Fresh,
    Stale,
    Unknown,
}

impl CacheStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(Self::Fresh),
            "stale" => Some(Self::Stale),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One cached resource
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Normalized URL
    pub key: String,

    pub kind: EntryKind,

    pub status: CacheStatus,

    /// SHA-256 of the content, hex encoded
    pub fingerprint: Option<String>,

    /// ETag or Last-Modified value from the last response
    pub validator: Option<String>,

    /// Artifact store key, for artifacts that were stored
    pub artifact_key: Option<String>,

    pub size: Option<u64>,

    pub last_checked: DateTime<Utc>,
}

impl CacheEntry {
    /// A page entry checked now
    pub fn page(key: &str, fingerprint: Option<String>, status: CacheStatus) -> Self {
        Self {
            key: key.to_string(),
            kind: EntryKind::Page,
            status,
            fingerprint,
            validator: None,
            artifact_key: None,
            size: None,
            last_checked: Utc::now(),
        }
    }

    /// An artifact entry checked now
    pub fn artifact(key: &str, fingerprint: Option<String>, status: CacheStatus) -> Self {
        Self {
            kind: EntryKind::Artifact,
            ..Self::page(key, fingerprint, status)
        }
    }

    pub fn with_validator(mut self, validator: Option<String>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_artifact(mut self, artifact_key: &str, size: u64) -> Self {
        self.artifact_key = Some(artifact_key.to_string());
        self.size = Some(size);
        self
    }
}

/// Role of a link recorded for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRole {
    Candidate,
    Navigable,
}

impl LinkRole {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Navigable => "navigable",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(Self::Candidate),
            "navigable" => Some(Self::Navigable),
            _ => None,
        }
    }
}

/// A link recorded at the end of a walk, replayed when the page is fresh
#[derive(Debug, Clone, PartialEq)]
pub struct PageLinkRecord {
    pub role: LinkRole,

    /// Normalized target URL
    pub target: String,

    pub link_text: String,

    /// Empty for navigable links
    pub signals: Vec<Signal>,

    pub confidence: f64,

    pub verdict: Option<Verdict>,
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Entry counts reported by [`CacheStore::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pages: u64,
    pub artifacts: u64,
    pub fresh_pages: u64,
    pub fresh_artifacts: u64,
    pub recorded_links: u64,
    pub runs: u64,
}

/// Formats a timestamp the way every table stores it
///
/// The fixed-width form keeps lexicographic order equal to time order, which the
/// prune and stats queries rely on.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Content fingerprint stored with page and artifact entries (SHA-256, hex)
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
