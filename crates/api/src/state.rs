use std::sync::Arc;

use imgproc_storage::BlobStore;
use imgproc_worker::{ProcessingService, TaskStore};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Durable task records.
    pub tasks: Arc<dyn TaskStore>,
    /// Original and processed image bytes.
    pub blobs: Arc<dyn BlobStore>,
    /// Background processing service; uploads are handed to it directly.
    pub processor: Arc<ProcessingService>,
    pub config: Arc<ServerConfig>,
}
