//! Artifact storage
//!
//! The scheduler persists downloaded bytes through the [`ArtifactStore`]
//! capability; which backend sits behind it is decided by configuration. This
//! crate ships a local filesystem backend.

mod key;
mod local;

pub use key::{artifact_key, artifact_filename};
pub use local::LocalStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by an artifact store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error writing {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),
}

/// Result type for artifact store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata stored alongside an artifact
#[derive(Debug, Clone, Default)]
pub struct ArtifactMetadata {
    pub source_url: String,
    pub source_page: String,
    pub content_type: Option<String>,

    /// SHA-256 of the content, hex encoded
    pub fingerprint: String,
}

/// Capability for persisting downloaded artifacts under a key
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous artifact
    async fn store(&self, key: &str, bytes: &[u8], metadata: &ArtifactMetadata) -> StoreResult<()>;

    /// Fast existence check used before a cache-driven skip
    async fn exists_fresh(&self, key: &str) -> bool;
}
