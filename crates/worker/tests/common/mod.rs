#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imgproc_core::status::TaskStatus;
use imgproc_core::types::DbId;
use imgproc_db::models::processed_image::{NewProcessedImage, ProcessedImage};
use imgproc_db::models::task::{NewTask, Task};
use imgproc_pipeline::{ResizeTransform, Transform, TransformError, TransformOutput};
use imgproc_storage::MemoryBlobStore;
use imgproc_worker::store::STORE_CALL_TIMEOUT;
use imgproc_worker::{
    MemoryTaskStore, ProcessingConfig, ProcessingService, StoreError, TaskStore,
};

/// Config with a short poll interval so tests do not wait on the default 5s.
pub fn fast_config(worker_pool_size: usize, task_batch_size: usize) -> ProcessingConfig {
    ProcessingConfig {
        worker_pool_size,
        polling_interval: Duration::from_millis(20),
        task_batch_size,
    }
}

/// Encode a solid `width x height` PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([40, 120, 200]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Store `data` as a blob and create a pending task pointing at it.
pub async fn seed_task(
    store: &MemoryTaskStore,
    blobs: &MemoryBlobStore,
    filename: &str,
    data: Vec<u8>,
) -> Task {
    let key = format!("seed_{filename}");
    blobs.insert(key.clone(), data).await;
    pending_task(store, filename, &key).await
}

/// Create a pending task without touching the blob store.
pub async fn pending_task(store: &MemoryTaskStore, filename: &str, key: &str) -> Task {
    store
        .create_task(&NewTask {
            original_filename: filename.to_string(),
            storage_key: key.to_string(),
        })
        .await
        .unwrap()
}

/// Poll `check` every 10ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn all_terminal(store: &MemoryTaskStore) -> bool {
    store.tasks().iter().all(|t| t.status.is_terminal())
}

/// In-memory stores plus a service wired to them.
pub struct Harness {
    pub store: Arc<MemoryTaskStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub service: Arc<ProcessingService>,
}

impl Harness {
    pub fn new(config: ProcessingConfig) -> Self {
        Self::with_transform(config, Arc::new(ResizeTransform::default()))
    }

    pub fn with_transform(config: ProcessingConfig, transform: Arc<dyn Transform>) -> Self {
        let store = Arc::new(MemoryTaskStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let service = Arc::new(ProcessingService::new(
            store.clone(),
            blobs.clone(),
            transform,
            config,
        ));
        Self {
            store,
            blobs,
            service,
        }
    }

    pub fn status(&self, id: DbId) -> TaskStatus {
        self.store
            .tasks()
            .into_iter()
            .find(|t| t.id == id)
            .map(|t| t.status)
            .unwrap()
    }
}

/// [`ResizeTransform`] that blocks for `delay` first, to keep tasks in
/// flight long enough to observe.
pub struct SlowTransform {
    pub delay: Duration,
    inner: ResizeTransform,
}

impl SlowTransform {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: ResizeTransform::default(),
        }
    }
}

impl Transform for SlowTransform {
    fn transform(
        &self,
        input: &[u8],
        original_filename: &str,
    ) -> Result<TransformOutput, TransformError> {
        std::thread::sleep(self.delay);
        self.inner.transform(input, original_filename)
    }
}

/// Task store whose first `failing_polls` calls to `get_pending_tasks` fail.
///
/// Status writes can be made to fail as well: the first `n` moves to
/// `processing` (claims) and the first `n` moves to a terminal status
/// (finishes) are rejected without touching the inner store.
pub struct FlakyStore {
    pub inner: Arc<MemoryTaskStore>,
    failing_polls: AtomicUsize,
    failing_claims: AtomicUsize,
    failing_finishes: AtomicUsize,
    polls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryTaskStore>, failing_polls: usize) -> Self {
        Self {
            inner,
            failing_polls: AtomicUsize::new(failing_polls),
            failing_claims: AtomicUsize::new(0),
            failing_finishes: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_claims(self, count: usize) -> Self {
        self.failing_claims.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_failing_finishes(self, count: usize) -> Self {
        self.failing_finishes.store(count, Ordering::SeqCst);
        self
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

/// Consume one unit of `budget`, returning whether one was left.
fn take_one(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn create_task(&self, input: &NewTask) -> Result<Task, StoreError> {
        self.inner.create_task(input).await
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>, StoreError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_polls) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.get_pending_tasks(limit).await
    }

    async fn update_task_status(
        &self,
        id: DbId,
        status: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        if status == TaskStatus::Processing && take_one(&self.failing_claims) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        if status.is_terminal() && take_one(&self.failing_finishes) {
            return Err(StoreError::Timeout {
                operation: "update_task_status",
                after: STORE_CALL_TIMEOUT,
            });
        }
        self.inner.update_task_status(id, status, error_message).await
    }

    async fn get_task_by_id(&self, id: DbId) -> Result<Task, StoreError> {
        self.inner.get_task_by_id(id).await
    }

    async fn record_processed_image(
        &self,
        input: &NewProcessedImage,
    ) -> Result<ProcessedImage, StoreError> {
        self.inner.record_processed_image(input).await
    }

    async fn get_processed_image(
        &self,
        task_id: DbId,
    ) -> Result<Option<ProcessedImage>, StoreError> {
        self.inner.get_processed_image(task_id).await
    }
}
