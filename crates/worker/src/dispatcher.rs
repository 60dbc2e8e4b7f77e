//! Background task dispatcher.
//!
//! Polls the task store for pending tasks and pushes them onto the work
//! queue. A full queue suspends the dispatcher, which keeps the number of
//! tasks pulled out of the store bounded. The next poll starts one full
//! `polling_interval` after the previous cycle finished, however long that
//! cycle spent waiting for queue capacity.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::queue::{PushError, PushOutcome, WorkQueue};
use crate::store::{with_deadline, StoreError, TaskStore};

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub fetched: usize,
    pub queued: usize,
    /// Tasks skipped because their id was already waiting in the queue.
    pub already_queued: usize,
    /// Fetched tasks left `pending` because shutdown began mid-batch.
    pub abandoned: usize,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    queue: Arc<WorkQueue>,
    batch_size: usize,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<WorkQueue>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            batch_size,
            poll_interval,
        }
    }

    /// Run the poll loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Task dispatcher started",
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Task dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.dispatch_once(&cancel).await {
                Ok(report) if report.abandoned > 0 => {
                    tracing::info!(
                        abandoned = report.abandoned,
                        "Shutdown during dispatch, remaining tasks stay pending",
                    );
                }
                Ok(report) if report.fetched > 0 => {
                    tracing::debug!(
                        fetched = report.fetched,
                        queued = report.queued,
                        already_queued = report.already_queued,
                        "Dispatch cycle complete",
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch pending tasks");
                }
            }

            ticker.reset();
        }
    }

    /// One poll: fetch up to `batch_size` pending tasks and enqueue them in
    /// order.
    pub async fn dispatch_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, StoreError> {
        let poll = with_deadline(
            "get_pending_tasks",
            self.store.get_pending_tasks(self.batch_size),
        );
        let tasks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(DispatchReport::default()),
            tasks = poll => tasks?,
        };

        let mut report = DispatchReport {
            fetched: tasks.len(),
            ..Default::default()
        };

        for (index, task) in tasks.into_iter().enumerate() {
            let task_id = task.id;
            match self.queue.push(task, cancel).await {
                Ok(PushOutcome::Queued) => {
                    tracing::debug!(task_id, "Task queued");
                    report.queued += 1;
                }
                Ok(PushOutcome::AlreadyQueued) => {
                    report.already_queued += 1;
                }
                Err(PushError::Cancelled) | Err(PushError::Closed) => {
                    report.abandoned = report.fetched - index;
                    break;
                }
            }
        }

        Ok(report)
    }
}
