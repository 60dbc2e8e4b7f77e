//! In-process [`TaskStore`] for development and tests.
//!
//! Applies the same transition rules as the PostgreSQL store and records
//! every accepted status change, so callers can replay the exact order in
//! which a task moved through its lifecycle.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use imgproc_core::status::TaskStatus;
use imgproc_core::types::{DbId, Timestamp};
use imgproc_db::models::processed_image::{NewProcessedImage, ProcessedImage};
use imgproc_db::models::task::{NewTask, Task};

use super::{StoreError, TaskStore};

/// One accepted status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task_id: DbId,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: Timestamp,
}

#[derive(Debug, Default)]
struct Inner {
    last_task_id: DbId,
    last_image_id: DbId,
    tasks: BTreeMap<DbId, Task>,
    processed: Vec<ProcessedImage>,
    transitions: Vec<Transition>,
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every accepted transition, in the order it was applied.
    pub fn transitions(&self) -> Vec<Transition> {
        self.lock().transitions.clone()
    }

    /// Statuses `task_id` has held, starting with `pending`.
    pub fn status_history(&self, task_id: DbId) -> Vec<TaskStatus> {
        let inner = self.lock();
        if !inner.tasks.contains_key(&task_id) {
            return Vec::new();
        }
        std::iter::once(TaskStatus::Pending)
            .chain(
                inner
                    .transitions
                    .iter()
                    .filter(|t| t.task_id == task_id)
                    .map(|t| t.to),
            )
            .collect()
    }

    /// Snapshot of all tasks ordered by id.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.values().cloned().collect()
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.lock()
            .tasks
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    /// Highest number of tasks that were `processing` at the same time.
    pub fn peak_processing(&self) -> usize {
        let mut current = 0usize;
        let mut peak = 0usize;
        for transition in self.lock().transitions.iter() {
            if transition.to == TaskStatus::Processing {
                current += 1;
                peak = peak.max(current);
            } else if transition.from == TaskStatus::Processing {
                current = current.saturating_sub(1);
            }
        }
        peak
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, input: &NewTask) -> Result<Task, StoreError> {
        let mut inner = self.lock();
        inner.last_task_id += 1;
        let now = Utc::now();
        let task = Task {
            id: inner.last_task_id,
            original_filename: input.original_filename.clone(),
            storage_key: input.storage_key.clone(),
            status: TaskStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let inner = self.lock();
        let mut pending: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn update_task_status(
        &self,
        id: DbId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let task = inner.tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let from = task.status;
        if !from.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from,
                to: status,
            });
        }

        let now = Utc::now().max(task.updated_at);
        task.status = status;
        task.updated_at = now;
        task.error_message = match status {
            TaskStatus::Failed => error_message.map(str::to_string),
            _ => None,
        };

        inner.transitions.push(Transition {
            task_id: id,
            from,
            to: status,
            at: now,
        });
        Ok(())
    }

    async fn get_task_by_id(&self, id: DbId) -> Result<Task, StoreError> {
        self.lock()
            .tasks
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn record_processed_image(
        &self,
        input: &NewProcessedImage,
    ) -> Result<ProcessedImage, StoreError> {
        let mut inner = self.lock();
        if !inner.tasks.contains_key(&input.task_id) {
            return Err(StoreError::NotFound(input.task_id));
        }
        inner.last_image_id += 1;
        let now = Utc::now();
        let image = ProcessedImage {
            id: inner.last_image_id,
            task_id: input.task_id,
            format: input.format.clone(),
            size: input.size.clone(),
            storage_key: input.storage_key.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.processed.push(image.clone());
        Ok(image)
    }

    async fn get_processed_image(
        &self,
        task_id: DbId,
    ) -> Result<Option<ProcessedImage>, StoreError> {
        Ok(self
            .lock()
            .processed
            .iter()
            .rev()
            .find(|p| p.task_id == task_id)
            .cloned())
    }
}
