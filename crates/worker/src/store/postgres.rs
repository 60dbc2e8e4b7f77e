//! [`TaskStore`] over PostgreSQL via the `imgproc-db` repositories.

use async_trait::async_trait;
use imgproc_core::status::TaskStatus;
use imgproc_core::types::DbId;
use imgproc_db::models::processed_image::{NewProcessedImage, ProcessedImage};
use imgproc_db::models::task::{NewTask, Task};
use imgproc_db::repositories::{ProcessedImageRepo, TaskRepo};
use imgproc_db::DbPool;

use super::{StoreError, TaskStore};

/// Production task store. Cheap to clone (the pool is reference counted).
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create_task(&self, input: &NewTask) -> Result<Task, StoreError> {
        Ok(TaskRepo::create(&self.pool, input).await?)
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(TaskRepo::list_pending(&self.pool, limit).await?)
    }

    async fn update_task_status(
        &self,
        id: DbId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        if TaskRepo::transition(&self.pool, id, status, error_message).await? {
            return Ok(());
        }

        // Nothing changed: tell a missing row apart from an illegal move.
        match TaskRepo::find_by_id(&self.pool, id).await? {
            None => Err(StoreError::NotFound(id)),
            Some(task) => Err(StoreError::InvalidTransition {
                id,
                from: task.status,
                to: status,
            }),
        }
    }

    async fn get_task_by_id(&self, id: DbId) -> Result<Task, StoreError> {
        TaskRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn record_processed_image(
        &self,
        input: &NewProcessedImage,
    ) -> Result<ProcessedImage, StoreError> {
        Ok(ProcessedImageRepo::create(&self.pool, input).await?)
    }

    async fn get_processed_image(
        &self,
        task_id: DbId,
    ) -> Result<Option<ProcessedImage>, StoreError> {
        Ok(ProcessedImageRepo::find_latest_by_task(&self.pool, task_id).await?)
    }
}
