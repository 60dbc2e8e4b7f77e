//! Bounded FIFO hand-off between producers (the dispatcher and direct
//! submissions) and the worker pool.
//!
//! Producers suspend while the queue is full. Each task id is held at most
//! once between push and pop, so a task that is both submitted directly and
//! picked up by a poll is only handed to one worker.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use imgproc_core::types::DbId;
use imgproc_db::models::task::Task;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Result of a successful [`WorkQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The task id was already waiting in the queue; nothing was added.
    AlreadyQueued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("Work queue is closed")]
    Closed,

    #[error("Cancelled while waiting for queue capacity")]
    Cancelled,
}

pub struct WorkQueue {
    /// Master sender. Taking it out closes the queue once in-flight pushes
    /// have released their clones.
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Task>>,
    queued: Mutex<HashSet<DbId>>,
    capacity: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkQueue {
    /// A queue holding at most `capacity` tasks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
            queued: Mutex::new(HashSet::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of task ids currently held, including pushes still waiting
    /// for capacity.
    pub fn len(&self) -> usize {
        lock(&self.queued).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    /// Enqueue `task`, waiting for capacity if the queue is full.
    ///
    /// The wait is abandoned when `cancel` fires; the task is then not
    /// enqueued and stays `pending` in the store.
    pub async fn push(
        &self,
        task: Task,
        cancel: &CancellationToken,
    ) -> Result<PushOutcome, PushError> {
        let sender = lock(&self.sender).clone().ok_or(PushError::Closed)?;
        if cancel.is_cancelled() {
            return Err(PushError::Cancelled);
        }

        let Some(mut reservation) = self.reserve(task.id) else {
            return Ok(PushOutcome::AlreadyQueued);
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PushError::Cancelled),
            res = sender.send(task) => {
                res.map_err(|_| PushError::Closed)?;
                reservation.commit();
                Ok(PushOutcome::Queued)
            }
        }
    }

    fn reserve(&self, id: DbId) -> Option<Reservation<'_>> {
        lock(&self.queued).insert(id).then(|| Reservation {
            queue: self,
            id,
            committed: false,
        })
    }

    /// Next task in FIFO order. `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Task> {
        let task = self.receiver.lock().await.recv().await?;
        lock(&self.queued).remove(&task.id);
        Some(task)
    }

    /// Stop accepting pushes. Tasks already enqueued are still delivered.
    ///
    /// Returns `false` if the queue was already closed.
    pub fn close(&self) -> bool {
        lock(&self.sender).take().is_some()
    }
}

/// Claim on a task id for the duration of a push. Released on drop unless
/// the task made it into the channel, so a push future dropped mid-wait
/// does not leave the id stuck.
struct Reservation<'a> {
    queue: &'a WorkQueue,
    id: DbId,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            lock(&self.queue.queued).remove(&self.id);
        }
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
