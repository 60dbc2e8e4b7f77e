//! Repository for the `processed_images` table.

use imgproc_core::types::DbId;
use sqlx::PgPool;

use crate::models::processed_image::{NewProcessedImage, ProcessedImage};

/// Column list for `processed_images` queries.
const COLUMNS: &str = "id, task_id, format, size, storage_key, created_at, updated_at";

/// Provides CRUD operations for derived image records.
pub struct ProcessedImageRepo;

impl ProcessedImageRepo {
    /// Record a derived image for a task.
    pub async fn create(
        pool: &PgPool,
        input: &NewProcessedImage,
    ) -> Result<ProcessedImage, sqlx::Error> {
        let query = format!(
            "INSERT INTO processed_images (task_id, format, size, storage_key) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessedImage>(&query)
            .bind(input.task_id)
            .bind(&input.format)
            .bind(&input.size)
            .bind(&input.storage_key)
            .fetch_one(pool)
            .await
    }

    /// Most recent derived image for a task, if any.
    pub async fn find_latest_by_task(
        pool: &PgPool,
        task_id: DbId,
    ) -> Result<Option<ProcessedImage>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM processed_images \
             WHERE task_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, ProcessedImage>(&query)
            .bind(task_id)
            .fetch_optional(pool)
            .await
    }
}
