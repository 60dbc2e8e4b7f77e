//! Lifecycle controller for the dispatcher and worker pool.
//!
//! States move strictly forward: `created -> running -> stopping -> stopped`.
//! [`ProcessingService::stop`] never aborts workers. A worker busy past the
//! deadline keeps running in the background and the service only reports
//! `stopped` once every spawned task has exited.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use imgproc_core::types::DbId;
use imgproc_db::models::task::Task;
use imgproc_pipeline::Transform;
use imgproc_storage::BlobStore;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessingConfig;
use crate::dispatcher::Dispatcher;
use crate::queue::{PushOutcome, WorkQueue};
use crate::stats::{StatsSnapshot, WorkerStats};
use crate::store::TaskStore;
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// How [`ProcessingService::stop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Every spawned task exited before the deadline.
    Drained,
    /// The deadline elapsed first; some tasks may still be finishing.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Processing service cannot start from state {0:?}")]
    AlreadyStarted(ServiceState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Processing service is shutting down, task {0} stays pending")]
    ShuttingDown(DbId),
}

pub struct ProcessingService {
    config: ProcessingConfig,
    store: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    transform: Arc<dyn Transform>,
    queue: Arc<WorkQueue>,
    stats: Arc<WorkerStats>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ServiceState>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ProcessingService {
    /// Build an idle service. Invalid config values are replaced by their
    /// defaults.
    pub fn new(
        store: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        transform: Arc<dyn Transform>,
        config: ProcessingConfig,
    ) -> Self {
        let config = config.normalized();
        let (state, _) = watch::channel(ServiceState::Created);
        Self {
            queue: Arc::new(WorkQueue::new(config.queue_capacity())),
            config,
            store,
            blobs,
            transform,
            stats: Arc::new(WorkerStats::new()),
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Tasks held by the work queue, counting pushes still blocked waiting
    /// for capacity.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Spawn the dispatcher and `worker_pool_size` workers.
    pub fn start(&self) -> Result<(), ServiceError> {
        let started = self.state.send_if_modified(|state| {
            if *state == ServiceState::Created {
                *state = ServiceState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ServiceError::AlreadyStarted(self.state()));
        }

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.config.task_batch_size,
            self.config.polling_interval,
        );
        handles.push(tokio::spawn(dispatcher.run(self.cancel.clone())));

        for worker_id in 1..=self.config.worker_pool_size {
            let worker = Worker::new(
                worker_id,
                Arc::clone(&self.store),
                Arc::clone(&self.blobs),
                Arc::clone(&self.transform),
                Arc::clone(&self.queue),
                Arc::clone(&self.stats),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        tracing::info!(
            workers = self.config.worker_pool_size,
            batch_size = self.config.task_batch_size,
            queue_capacity = self.queue.capacity(),
            poll_interval_ms = self.config.polling_interval.as_millis() as u64,
            "Image processing service started",
        );
        Ok(())
    }

    /// Hand a freshly created task straight to the work queue.
    ///
    /// Waits while the queue is full. Rejected once shutdown has begun; the
    /// task then stays `pending` in the store.
    pub async fn submit(&self, task: Task) -> Result<PushOutcome, SubmitError> {
        let task_id = task.id;
        if self.cancel.is_cancelled() {
            tracing::warn!(task_id, "Rejecting task submission, service is shutting down");
            return Err(SubmitError::ShuttingDown(task_id));
        }

        match self.queue.push(task, &self.cancel).await {
            Ok(outcome) => {
                tracing::debug!(task_id, ?outcome, "Task submitted for processing");
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Task submission rejected");
                Err(SubmitError::ShuttingDown(task_id))
            }
        }
    }

    /// Signal shutdown and wait up to `deadline` for the dispatcher and all
    /// workers to exit. Safe to call more than once.
    pub async fn stop(&self, deadline: Duration) -> StopOutcome {
        let mut previous = ServiceState::Stopped;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ServiceState::Created => {
                    *state = ServiceState::Stopped;
                    true
                }
                ServiceState::Running => {
                    *state = ServiceState::Stopping;
                    true
                }
                ServiceState::Stopping | ServiceState::Stopped => false,
            }
        });

        self.cancel.cancel();
        self.queue.close();

        if previous == ServiceState::Running {
            tracing::info!("Stopping image processing service");
            self.spawn_reaper();
        }

        match tokio::time::timeout(deadline, self.wait_stopped()).await {
            Ok(()) => {
                tracing::info!("Image processing service stopped, all tasks finished");
                StopOutcome::Drained
            }
            Err(_) => {
                tracing::warn!(
                    deadline_secs = deadline.as_secs(),
                    in_flight = self.stats.snapshot().in_flight,
                    "Shutdown deadline elapsed, some tasks may not have finished",
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Resolve once the service reaches `stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state == ServiceState::Stopped).await;
    }

    /// Await every spawned task in the background, then mark the service
    /// stopped.
    fn spawn_reaper(&self) {
        let handles = std::mem::take(
            &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Processing task ended abnormally");
                }
            }
            state.send_replace(ServiceState::Stopped);
            tracing::debug!("All processing tasks exited");
        });
    }
}

impl std::fmt::Debug for ProcessingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingService")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
