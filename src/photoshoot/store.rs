// Artifact store - append-only flat directory of generated images

use super::types::{StoredArtifact, extension_for_media_type};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Upper bound on name collisions tried within one millisecond
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Somewhere generated images can be written and later served from
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `bytes` under a fresh name; existing entries are never overwritten
    async fn persist(&self, bytes: &[u8], media_type: &str) -> Result<StoredArtifact, StoreError>;
}

/// Flat, publicly servable directory
///
/// Files are named `saree-{unix_millis}.{ext}`. There is no index: the
/// in-memory run state is the only record of which file belongs to which
/// pose, so files are not rediscovered after a restart.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    public_prefix: String,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    fn candidate_name(stamp: i64, attempt: u32, ext: &str) -> String {
        if attempt == 0 {
            format!("saree-{}.{}", stamp, ext)
        } else {
            format!("saree-{}-{}.{}", stamp, attempt, ext)
        }
    }
}

#[async_trait]
impl ArtifactStore for DirectoryStore {
    async fn persist(&self, bytes: &[u8], media_type: &str) -> Result<StoredArtifact, StoreError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            StoreError::Io(format!(
                "Failed to create output dir {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let ext = extension_for_media_type(media_type);
        let stamp = Utc::now().timestamp_millis();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = Self::candidate_name(stamp, attempt, ext);
            let path = self.root.join(&file_name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StoreError::Io(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        e
                    )));
                }
            };

            file.write_all(bytes)
                .await
                .map_err(|e| StoreError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
            file.flush()
                .await
                .map_err(|e| StoreError::Io(format!("Failed to flush {}: {}", path.display(), e)))?;

            tracing::debug!(file = %file_name, bytes = bytes.len(), "Stored generated image");

            return Ok(StoredArtifact {
                public_url: format!("{}/{}", self.public_prefix, file_name),
                file_name,
                path,
            });
        }

        Err(StoreError::NameExhausted(stamp))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("No free file name for timestamp {0}")]
    NameExhausted(i64),
}
