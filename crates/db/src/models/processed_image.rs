//! Derived image produced by a completed task.

use imgproc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `processed_images` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ProcessedImage {
    pub id: DbId,
    pub task_id: DbId,
    /// Output encoding, e.g. `jpeg`.
    pub format: String,
    /// Output dimensions as `WxH`.
    pub size: String,
    pub storage_key: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for recording a derived image.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProcessedImage {
    pub task_id: DbId,
    pub format: String,
    pub size: String,
    pub storage_key: String,
}
