//! Filesystem-backed blob store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use imgproc_core::naming::{now_nanos, timestamped_key};
use tokio::io::AsyncWriteExt;

use crate::error::BlobError;
use crate::{validate_key, BlobStore};

/// How many fresh timestamps to try before giving up on a key collision.
const MAX_KEY_ATTEMPTS: i64 = 8;

/// Stores each blob as a file directly under `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_dir: PathBuf,
}

impl LocalBlobStore {
    /// Open the store, creating `base_dir` if it does not exist.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, BlobError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.base_dir.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, filename: &str, data: Vec<u8>) -> Result<String, BlobError> {
        let base = now_nanos();
        for attempt in 0..MAX_KEY_ATTEMPTS {
            let key = timestamped_key(filename, base + attempt);
            let path = self.path_for(&key)?;

            // `create_new` never overwrites: a collision just retries.
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };

            let written = async {
                file.write_all(&data).await?;
                file.flush().await
            }
            .await;

            if let Err(e) = written {
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "Failed to remove partially written blob",
                    );
                }
                return Err(e.into());
            }

            return Ok(key);
        }

        Err(BlobError::Backend(format!(
            "Could not allocate a unique key for '{filename}'"
        )))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
