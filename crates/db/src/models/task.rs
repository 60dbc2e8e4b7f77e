//! Image processing task entity and its create DTO.

use imgproc_core::status::TaskStatus;
use imgproc_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `image_processing_tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub original_filename: String,
    pub storage_key: String,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    /// Present only when `status` is `failed`.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for recording a freshly uploaded image. Tasks always start `pending`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub original_filename: String,
    pub storage_key: String,
}
