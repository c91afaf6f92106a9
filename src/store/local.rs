use crate::store::{ArtifactMetadata, ArtifactStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Artifact store writing under a local directory
///
/// Keys map to relative paths below the root. Writes go to a temporary sibling
/// file first and are renamed into place, so a crash never leaves a truncated
/// artifact under the final key.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path below the root, rejecting escapes
    pub fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn store(&self, key: &str, bytes: &[u8], metadata: &ArtifactMetadata) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        debug!(
            key,
            bytes = bytes.len(),
            source = %metadata.source_url,
            fingerprint = %metadata.fingerprint,
            "stored artifact"
        );
        Ok(())
    }

    async fn exists_fresh(&self, key: &str) -> bool {
        let Ok(path) = self.path_for(key) else {
            return false;
        };
        matches!(tokio::fs::metadata(&path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
    }
}
