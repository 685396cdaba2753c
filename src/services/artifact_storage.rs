//! Access to the export artifacts on disk.
//!
//! The record manager never touches the filesystem directly; it goes through
//! an [`ArtifactStore`] so the deletion path can be bounded and tested.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ArtifactStorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type ArtifactStorageResult<T> = Result<T, ArtifactStorageError>;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Size in bytes of the artifact at `path`, or None if it does not exist.
    async fn size_of(&self, path: &Path) -> ArtifactStorageResult<Option<u64>>;

    /// Remove the artifact at `path`.
    ///
    /// An artifact that is already gone counts as removed.
    async fn delete(&self, path: &Path) -> ArtifactStorageResult<()>;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}

/// Artifacts stored as plain files on a local filesystem.
pub struct FilesystemArtifactStore {
    timeout: Duration,
}

impl FilesystemArtifactStore {
    /// `timeout` bounds every filesystem call.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> ArtifactStorageResult<T>
    where
        F: std::future::Future<Output = ArtifactStorageResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ArtifactStorageError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn size_of(&self, path: &Path) -> ArtifactStorageResult<Option<u64>> {
        self.bounded(async {
            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
                Ok(_) => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(ArtifactStorageError::Io(e)),
            }
        })
        .await
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete(&self, path: &Path) -> ArtifactStorageResult<()> {
        debug!("Deleting artifact from filesystem");
        self.bounded(async {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!("Artifact deleted");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Artifact already gone during deletion");
                    Ok(())
                }
                Err(e) => Err(ArtifactStorageError::Io(e)),
            }
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
