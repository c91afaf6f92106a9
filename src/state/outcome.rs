use crate::state::Candidate;
use std::fmt;
use std::time::Instant;

/// Terminal state of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeState {
    Downloaded,
    SkippedDuplicate,
    SkippedInvalid,
    Failed,
}

impl OutcomeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::SkippedDuplicate => "skipped-duplicate",
            Self::SkippedInvalid => "skipped-invalid",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of scheduler work, created from a candidate that passed the cache check
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub candidate: Candidate,

    /// Artifact store key (`group/category/filename`)
    pub destination: String,

    /// Attempts made so far
    pub attempt: u32,

    /// Earliest time the next attempt may start
    pub next_eligible: Option<Instant>,
}

impl DownloadTask {
    pub fn new(candidate: Candidate, destination: String) -> Self {
        Self {
            candidate,
            destination,
            attempt: 0,
            next_eligible: None,
        }
    }

    /// Normalized URL, also the cache key
    pub fn key(&self) -> &str {
        self.candidate.cache_key()
    }
}

/// The immutable result for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub url: String,

    pub state: OutcomeState,

    /// Size of the stored artifact (0 unless downloaded)
    pub bytes: u64,

    /// Network attempts made (0 when decided from the cache)
    pub attempts: u32,

    /// Artifact key, when one was assigned
    pub artifact_key: Option<String>,

    /// Error kind and message for skipped-invalid and failed outcomes
    pub error: Option<String>,
}

impl Outcome {
    pub fn downloaded(url: &str, key: &str, bytes: u64, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            state: OutcomeState::Downloaded,
            bytes,
            attempts,
            artifact_key: Some(key.to_string()),
            error: None,
        }
    }

    pub fn duplicate(url: &str, key: Option<&str>, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            state: OutcomeState::SkippedDuplicate,
            bytes: 0,
            attempts,
            artifact_key: key.map(str::to_string),
            error: None,
        }
    }

    pub fn invalid(url: &str, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            state: OutcomeState::SkippedInvalid,
            bytes: 0,
            attempts,
            artifact_key: None,
            error: Some(reason.into()),
        }
    }

    pub fn failed(url: &str, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            state: OutcomeState::Failed,
            bytes: 0,
            attempts,
            artifact_key: None,
            error: Some(error.into()),
        }
    }
}
