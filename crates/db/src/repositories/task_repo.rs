//! Repository for the `image_processing_tasks` table.
//!
//! Status writes are guarded: a row only changes when its current status is
//! a legal predecessor of the target (see [`TaskStatus::predecessors`]).

use imgproc_core::status::{StatusId, TaskStatus};
use imgproc_core::types::DbId;
use sqlx::PgPool;

use crate::models::task::{NewTask, Task};

/// Column list for task queries.
const COLUMNS: &str = "\
    id, original_filename, storage_key, status_id, error_message, \
    created_at, updated_at";

/// Provides CRUD operations for image processing tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new `pending` task.
    pub async fn create(pool: &PgPool, input: &NewTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO image_processing_tasks (original_filename, storage_key, status_id) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&input.original_filename)
            .bind(&input.storage_key)
            .bind(TaskStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM image_processing_tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Up to `limit` pending tasks, oldest `created_at` first.
    pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM image_processing_tasks \
             WHERE status_id = $1 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(TaskStatus::Pending.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Move a task to `status`, refreshing `updated_at`.
    ///
    /// `error_message` is only stored for `failed`; other targets clear it.
    /// Returns `false` when no row changed, either because the task does not
    /// exist or because its current status may not precede `status`.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let from: Vec<StatusId> = status.predecessors().iter().map(|s| s.id()).collect();
        let error_message = error_message.filter(|_| status == TaskStatus::Failed);

        let result = sqlx::query(
            "UPDATE image_processing_tasks \
             SET status_id = $2, error_message = $3, \
                 updated_at = GREATEST(NOW(), updated_at) \
             WHERE id = $1 AND status_id = ANY($4)",
        )
        .bind(id)
        .bind(status.id())
        .bind(error_message)
        .bind(&from)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a task. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM image_processing_tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
