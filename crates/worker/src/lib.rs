//! Asynchronous image task processing.
//!
//! A [`Dispatcher`] moves pending tasks from the durable [`TaskStore`] into a
//! bounded [`WorkQueue`]; a fixed pool of [`Worker`]s drains the queue and
//! carries each task through `pending -> processing -> completed | failed`.
//! [`ProcessingService`] owns all of it and handles start-up and shutdown.

pub mod config;
pub mod dispatcher;
pub mod queue;
pub mod service;
pub mod signal;
pub mod stats;
pub mod store;
pub mod worker;

pub use config::ProcessingConfig;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use queue::{PushError, PushOutcome, WorkQueue};
pub use service::{ProcessingService, ServiceError, ServiceState, StopOutcome, SubmitError};
pub use stats::{StatsSnapshot, WorkerStats};
pub use store::{MemoryTaskStore, PgTaskStore, StoreError, TaskStore};
pub use worker::{ProcessError, TaskOutcome, Worker};
