//! Blob storage for original uploads and derived images.
//!
//! [`BlobStore`] is the narrow capability the rest of the system depends on.
//! Three backends are provided: [`LocalBlobStore`] (filesystem),
//! [`S3BlobStore`] (S3 or any S3-compatible endpoint) and
//! [`MemoryBlobStore`] (in-process, for development and tests).
//!
//! Every backend generates its own keys on save (`<stem>_<unix-nanos><ext>`),
//! so callers pass a human file name and get back an opaque storage key.

use std::sync::Arc;

use async_trait::async_trait;

pub mod config;
pub mod error;
pub mod local;
pub mod memory;
pub mod s3;

pub use config::{StorageConfig, StorageKind};
pub use error::BlobError;
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// Save / get / delete semantics over opaque storage keys.
///
/// Implementations must be safe for concurrent use; callers perform no
/// locking of their own.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under a new key derived from `filename`, returning the key.
    async fn save(&self, filename: &str, data: Vec<u8>) -> Result<String, BlobError>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Remove the blob stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Build the backend selected by `config`.
pub async fn build_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, BlobError> {
    let store: Arc<dyn BlobStore> = match config.kind {
        StorageKind::Local => Arc::new(LocalBlobStore::new(&config.local_dir).await?),
        StorageKind::S3 => Arc::new(S3BlobStore::connect(&config.s3).await?),
        StorageKind::Memory => Arc::new(MemoryBlobStore::new()),
    };
    tracing::info!(kind = config.kind.name(), "Blob store initialised");
    Ok(store)
}

/// Reject keys that could escape the store's namespace.
///
/// Keys are single path components, so only `.`, `..` and separators are
/// traversal. A `..` inside a name (`holiday..beach.png`) is an ordinary
/// file name.
pub(crate) fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    Ok(())
}
