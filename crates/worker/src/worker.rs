//! A single pool worker: pulls tasks off the queue and drives each one
//! through `processing` to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use imgproc_core::status::TaskStatus;
use imgproc_core::types::DbId;
use imgproc_db::models::processed_image::NewProcessedImage;
use imgproc_db::models::task::Task;
use imgproc_pipeline::{Transform, TransformError};
use imgproc_storage::{BlobError, BlobStore};

use crate::queue::WorkQueue;
use crate::stats::WorkerStats;
use crate::store::{with_deadline, TaskStore};

/// Deadline applied to every individual blob store call.
pub const BLOB_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Why processing a claimed task failed. The `Display` output becomes the
/// task's `error_message`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to fetch original image {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: BlobError,
    },

    #[error("{0}")]
    Transform(#[from] TransformError),

    #[error("Image transform aborted: {0}")]
    TransformAborted(String),

    #[error("Failed to save processed image {filename}: {source}")]
    Save {
        filename: String,
        #[source]
        source: BlobError,
    },

    #[error("Blob store call '{operation}' timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// How a worker left a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Could not claim the task; it was left as the store had it.
    Abandoned,
    Completed,
    Failed(String),
    /// Processing finished but the final status write did not land, so the
    /// task is stuck in `processing`.
    Unrecorded(TaskStatus),
}

/// Derivative written for a successfully processed task.
#[derive(Debug)]
struct Derivative {
    key: String,
    format: &'static str,
    size: String,
}

pub struct Worker {
    id: usize,
    store: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    transform: Arc<dyn Transform>,
    queue: Arc<WorkQueue>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(
        id: usize,
        store: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        transform: Arc<dyn Transform>,
        queue: Arc<WorkQueue>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            id,
            store,
            blobs,
            transform,
            queue,
            stats,
        }
    }

    /// Process tasks one at a time until the queue is closed and drained.
    pub async fn run(self) {
        tracing::debug!(worker_id = self.id, "Worker started");
        while let Some(task) = self.queue.pop().await {
            self.handle(task).await;
        }
        tracing::debug!(worker_id = self.id, "Worker exiting, queue closed");
    }

    /// Claim `task`, process it and write the terminal status.
    ///
    /// Not cancellable: once claimed, a task always gets its final status
    /// write attempt, even during shutdown.
    pub async fn handle(&self, task: Task) -> TaskOutcome {
        let task_id = task.id;

        if let Err(e) = with_deadline(
            "update_task_status",
            self.store
                .update_task_status(task_id, TaskStatus::Processing, None),
        )
        .await
        {
            tracing::warn!(
                task_id,
                worker_id = self.id,
                error = %e,
                "Failed to mark task as processing, abandoning",
            );
            self.stats.record_abandoned();
            return TaskOutcome::Abandoned;
        }

        self.stats.task_started();
        tracing::info!(
            task_id,
            worker_id = self.id,
            filename = %task.original_filename,
            "Processing task",
        );

        let outcome = match self.process(&task).await {
            Ok(derivative) => {
                self.record_derivative(task_id, &derivative).await;
                tracing::info!(
                    task_id,
                    worker_id = self.id,
                    processed_key = %derivative.key,
                    size = %derivative.size,
                    "Task completed",
                );
                self.finish(task_id, TaskStatus::Completed, None).await
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    task_id,
                    worker_id = self.id,
                    error = %message,
                    "Task failed",
                );
                self.finish(task_id, TaskStatus::Failed, Some(&message)).await
            }
        };

        self.stats.task_finished();
        outcome
    }

    async fn process(&self, task: &Task) -> Result<Derivative, ProcessError> {
        let key = task.storage_key.clone();
        let fetched = tokio::time::timeout(BLOB_CALL_TIMEOUT, self.blobs.get(&key)).await;
        let original = match fetched {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(source)) => return Err(ProcessError::Fetch { key, source }),
            Err(_) => return Err(blob_timeout("get")),
        };

        let transform = Arc::clone(&self.transform);
        let filename = task.original_filename.clone();
        let output = tokio::task::spawn_blocking(move || transform.transform(&original, &filename))
            .await
            .map_err(|e| ProcessError::TransformAborted(e.to_string()))??;

        let size = output.size();
        let saved = tokio::time::timeout(
            BLOB_CALL_TIMEOUT,
            self.blobs.save(&output.filename, output.bytes),
        )
        .await;
        let key = match saved {
            Ok(Ok(key)) => key,
            Ok(Err(source)) => {
                return Err(ProcessError::Save {
                    filename: output.filename,
                    source,
                })
            }
            Err(_) => return Err(blob_timeout("save")),
        };

        Ok(Derivative {
            key,
            format: output.format,
            size,
        })
    }

    /// Record the derivative. Failure here does not fail the task: the
    /// bytes are already stored.
    async fn record_derivative(&self, task_id: DbId, derivative: &Derivative) {
        let record = NewProcessedImage {
            task_id,
            format: derivative.format.to_string(),
            size: derivative.size.clone(),
            storage_key: derivative.key.clone(),
        };
        if let Err(e) = with_deadline(
            "record_processed_image",
            self.store.record_processed_image(&record),
        )
        .await
        {
            tracing::warn!(
                task_id,
                processed_key = %derivative.key,
                error = %e,
                "Failed to record processed image",
            );
        }
    }

    async fn finish(
        &self,
        task_id: DbId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> TaskOutcome {
        let write = with_deadline(
            "update_task_status",
            self.store.update_task_status(task_id, status, error_message),
        )
        .await;

        match (write, status) {
            (Ok(()), TaskStatus::Completed) => {
                self.stats.record_completed();
                TaskOutcome::Completed
            }
            (Ok(()), _) => {
                self.stats.record_failed();
                TaskOutcome::Failed(error_message.unwrap_or_default().to_string())
            }
            (Err(e), _) => {
                tracing::error!(
                    task_id,
                    worker_id = self.id,
                    status = %status,
                    error = %e,
                    "FATAL: failed to write final task status, task left in processing",
                );
                self.stats.record_unrecorded();
                TaskOutcome::Unrecorded(status)
            }
        }
    }
}

fn blob_timeout(operation: &'static str) -> ProcessError {
    ProcessError::Timeout {
        operation,
        after: BLOB_CALL_TIMEOUT,
    }
}
