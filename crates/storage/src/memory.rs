//! In-process blob store for development and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use imgproc_core::naming::{now_nanos, timestamped_key};
use tokio::sync::RwLock;

use crate::error::BlobError;
use crate::{validate_key, BlobStore};

/// Keeps every blob in a map. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    saves: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under an exact key, bypassing key generation.
    pub async fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.blobs.write().await.insert(key.into(), data);
    }

    /// Number of successful [`BlobStore::save`] calls so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, filename: &str, data: Vec<u8>) -> Result<String, BlobError> {
        let mut blobs = self.blobs.write().await;
        let mut nanos = now_nanos();
        let key = loop {
            let key = timestamped_key(filename, nanos);
            validate_key(&key)?;
            if !blobs.contains_key(&key) {
                break key;
            }
            nanos += 1;
        };
        blobs.insert(key.clone(), data);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        validate_key(key)?;
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        self.blobs
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}
