//! Processing configuration loaded from environment variables.
//!
//! | Env var                          | Default |
//! |----------------------------------|---------|
//! | `PROCESSING_WORKER_POOL_SIZE`    | `5`     |
//! | `PROCESSING_POLLING_INTERVAL_MS` | `5000`  |
//! | `PROCESSING_TASK_BATCH_SIZE`     | `10`    |

use std::time::Duration;

use imgproc_core::env;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 5;
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_TASK_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingConfig {
    /// Number of concurrent workers.
    pub worker_pool_size: usize,
    /// Wait between the end of one poll cycle and the start of the next.
    pub polling_interval: Duration,
    /// Maximum pending tasks fetched per poll.
    pub task_batch_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            task_batch_size: DEFAULT_TASK_BATCH_SIZE,
        }
    }
}

impl ProcessingConfig {
    /// Load from the environment. Non-positive values fall back to the
    /// defaults with a warning.
    pub fn from_env() -> Self {
        let pool = env::parse_or::<i64>(
            "PROCESSING_WORKER_POOL_SIZE",
            DEFAULT_WORKER_POOL_SIZE as i64,
        );
        let interval_ms = env::parse_or::<i64>(
            "PROCESSING_POLLING_INTERVAL_MS",
            DEFAULT_POLLING_INTERVAL.as_millis() as i64,
        );
        let batch = env::parse_or::<i64>(
            "PROCESSING_TASK_BATCH_SIZE",
            DEFAULT_TASK_BATCH_SIZE as i64,
        );

        Self {
            worker_pool_size: usize::try_from(pool).unwrap_or(0),
            polling_interval: Duration::from_millis(u64::try_from(interval_ms).unwrap_or(0)),
            task_batch_size: usize::try_from(batch).unwrap_or(0),
        }
        .normalized()
    }

    /// Replace zero values with the defaults.
    pub fn normalized(self) -> Self {
        let mut config = self;
        if config.worker_pool_size == 0 {
            tracing::warn!(
                default = DEFAULT_WORKER_POOL_SIZE,
                "Worker pool size must be positive, using default"
            );
            config.worker_pool_size = DEFAULT_WORKER_POOL_SIZE;
        }
        if config.polling_interval.is_zero() {
            tracing::warn!(
                default_ms = DEFAULT_POLLING_INTERVAL.as_millis() as u64,
                "Polling interval must be positive, using default"
            );
            config.polling_interval = DEFAULT_POLLING_INTERVAL;
        }
        if config.task_batch_size == 0 {
            tracing::warn!(
                default = DEFAULT_TASK_BATCH_SIZE,
                "Task batch size must be positive, using default"
            );
            config.task_batch_size = DEFAULT_TASK_BATCH_SIZE;
        }
        config
    }

    /// Work queue capacity: two poll batches.
    pub fn queue_capacity(&self) -> usize {
        self.task_batch_size.saturating_mul(2)
    }
}
