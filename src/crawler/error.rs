//! Error taxonomy for network work and download tasks

use crate::cache::CacheError;
use crate::crawler::retry::FailureKind;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single network request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: u16,
        /// Parsed `Retry-After` header, when the server sent one
        retry_after: Option<Duration>,
    },

    #[error("failed reading body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("{url} exceeds the size limit ({size} > {limit} bytes)")]
    TooLarge { url: String, size: u64, limit: u64 },

    #[error("request to {url} failed: {message}")]
    Other { url: String, message: String },
}

impl FetchError {
    /// Classifies a reqwest error raised while sending a request
    pub fn from_reqwest(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if error.is_body() || error.is_decode() {
            Self::Body {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else if error.is_connect() || error.is_request() || has_io_source(&error) {
            // Resets and connections closed mid-exchange surface as request errors
            Self::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after: None,
            }
        } else {
            Self::Other {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Maps the error onto the retry taxonomy
    ///
    /// | Error | Kind |
    /// |-------|------|
    /// | timeout, connect, body read | Transient |
    /// | HTTP 5xx, HTTP 408 | Transient |
    /// | HTTP 429 | RateLimited |
    /// | other HTTP 4xx | Permanent |
    /// | size limit, malformed request | Permanent |
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } | Self::Body { .. } => FailureKind::Transient,
            Self::Status { status, .. } => match *status {
                429 => FailureKind::RateLimited,
                408 => FailureKind::Transient,
                s if s >= 500 => FailureKind::Transient,
                _ => FailureKind::Permanent,
            },
            Self::TooLarge { .. } | Self::Other { .. } => FailureKind::Permanent,
        }
    }

    /// Short error kind label used in outcome records
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connect { .. } => "connect",
            Self::Status { .. } => "http-status",
            Self::Body { .. } => "body",
            Self::TooLarge { .. } => "too-large",
            Self::Other { .. } => "request",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// True when an I/O error sits anywhere in the source chain
fn has_io_source(error: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if inner.is::<std::io::Error>() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Failure of one download task attempt
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The resource is not the target format; retrying cannot fix it
    #[error("not a PDF: {reason}")]
    Invalid { reason: String },
}

impl TaskError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Storage and cache failures retry like transient network faults
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Fetch(e) => e.failure_kind(),
            Self::Store(_) | Self::Cache(_) => FailureKind::Transient,
            Self::Invalid { .. } => FailureKind::Permanent,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Fetch(e) => e.retry_after(),
            _ => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind_label(),
            Self::Store(_) => "storage",
            Self::Cache(_) => "cache",
            Self::Invalid { .. } => "invalid",
        }
    }
}
