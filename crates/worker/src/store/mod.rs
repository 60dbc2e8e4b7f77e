//! Durable task store capability.
//!
//! [`TaskStore`] is the narrow interface the dispatcher, the workers and the
//! upload path need. [`PgTaskStore`] is the production implementation;
//! [`MemoryTaskStore`] keeps everything in process.
//!
//! Both implementations enforce the status state machine on
//! [`TaskStore::update_task_status`]: a write that is not a legal transition
//! fails with [`StoreError::InvalidTransition`] and changes nothing.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use imgproc_core::status::TaskStatus;
use imgproc_core::types::DbId;
use imgproc_db::models::processed_image::{NewProcessedImage, ProcessedImage};
use imgproc_db::models::task::{NewTask, Task};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryTaskStore, Transition};
pub use postgres::PgTaskStore;

/// Deadline applied to every individual task store call made by the core.
pub const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by [`TaskStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Task {0} not found")]
    NotFound(DbId),

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: DbId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task store call '{operation}' timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Task store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence operations for image processing tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task with status `pending`.
    async fn create_task(&self, input: &NewTask) -> Result<Task, StoreError>;

    /// Up to `limit` pending tasks, oldest `created_at` first.
    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError>;

    /// Move a task to `status`. `error_message` is kept only for `failed`.
    async fn update_task_status(
        &self,
        id: DbId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get_task_by_id(&self, id: DbId) -> Result<Task, StoreError>;

    /// Record the derivative produced for a task.
    async fn record_processed_image(
        &self,
        input: &NewProcessedImage,
    ) -> Result<ProcessedImage, StoreError>;

    /// Most recent derivative recorded for a task, if any.
    async fn get_processed_image(&self, task_id: DbId)
        -> Result<Option<ProcessedImage>, StoreError>;
}

/// Run a store call under [`STORE_CALL_TIMEOUT`].
pub async fn with_deadline<T, F>(operation: &'static str, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(STORE_CALL_TIMEOUT, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            after: STORE_CALL_TIMEOUT,
        }),
    }
}
