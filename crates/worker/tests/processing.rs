//! End-to-end processing through the dispatcher and worker pool, against
//! the in-memory task and blob stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use imgproc_core::status::TaskStatus;
use imgproc_pipeline::ResizeTransform;
use imgproc_storage::{BlobStore, MemoryBlobStore};
use imgproc_worker::{
    MemoryTaskStore, ProcessingConfig, ProcessingService, PushOutcome, SubmitError, TaskOutcome, TaskStore,
    WorkQueue, Worker, WorkerStats,
};
use tokio_util::sync::CancellationToken;

use common::{
    all_terminal, eventually, fast_config, pending_task, png_bytes, seed_task, FlakyStore,
    Harness, SlowTransform,
};

const WAIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Test: a valid image is resized to 800px wide and the task completes
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn valid_image_is_resized_and_completed() {
    let h = Harness::new(fast_config(1, 1));
    let task = seed_task(&h.store, &h.blobs, "square.png", png_bytes(100, 100)).await;

    h.service.start().unwrap();
    assert!(eventually(WAIT, || h.status(task.id) == TaskStatus::Completed).await);
    h.service.stop(WAIT).await;

    let processed = h
        .store
        .get_processed_image(task.id)
        .await
        .unwrap()
        .expect("processed image recorded");
    assert_eq!(processed.format, "jpeg");
    assert_eq!(processed.size, "800x800");
    assert!(processed.storage_key.starts_with("square_800x800_"));

    let bytes = h.blobs.get(&processed.storage_key).await.unwrap();
    let derived = image::load_from_memory(&bytes).unwrap();
    assert_eq!((derived.width(), derived.height()), (800, 800));

    assert_eq!(h.blobs.save_count(), 1);
    assert_eq!(h.blobs.len().await, 2);
    assert_eq!(h.service.stats().completed, 1);
}

// ---------------------------------------------------------------------------
// Test: aspect ratio is preserved for non-square sources
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wide_image_keeps_aspect_ratio() {
    let h = Harness::new(fast_config(1, 1));
    let task = seed_task(&h.store, &h.blobs, "wide.png", png_bytes(400, 100)).await;

    h.service.start().unwrap();
    assert!(eventually(WAIT, || h.status(task.id) == TaskStatus::Completed).await);
    h.service.stop(WAIT).await;

    let processed = h.store.get_processed_image(task.id).await.unwrap().unwrap();
    assert_eq!(processed.size, "800x200");
}

// ---------------------------------------------------------------------------
// Test: a missing source blob fails the task without writing anything
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_source_fails_without_blob_write() {
    let h = Harness::new(fast_config(1, 1));
    let task = pending_task(&h.store, "ghost.png", "ghost_1.png").await;

    h.service.start().unwrap();
    assert!(eventually(WAIT, || h.status(task.id) == TaskStatus::Failed).await);
    h.service.stop(WAIT).await;

    let stored = h.store.get_task_by_id(task.id).await.unwrap();
    let message = stored.error_message.unwrap_or_default();
    assert!(!message.is_empty());
    assert!(message.contains("ghost_1.png"), "{message}");
    assert_eq!(h.blobs.save_count(), 0);
    assert!(h.store.get_processed_image(task.id).await.unwrap().is_none());
    assert_eq!(h.service.stats().failed, 1);
}

// ---------------------------------------------------------------------------
// Test: undecodable bytes fail the task
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupt_source_fails_with_decode_error() {
    let h = Harness::new(fast_config(1, 1));
    let task = seed_task(&h.store, &h.blobs, "broken.png", b"not an image".to_vec()).await;

    h.service.start().unwrap();
    assert!(eventually(WAIT, || h.status(task.id) == TaskStatus::Failed).await);
    h.service.stop(WAIT).await;

    let stored = h.store.get_task_by_id(task.id).await.unwrap();
    assert!(stored
        .error_message
        .unwrap_or_default()
        .starts_with("Failed to decode image"));
}

// ---------------------------------------------------------------------------
// Test: the pool never runs more tasks than it has workers
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_size_bounds_concurrent_processing() {
    let h = Harness::with_transform(
        fast_config(2, 10),
        Arc::new(SlowTransform::new(Duration::from_millis(150))),
    );
    for i in 0..3 {
        seed_task(&h.store, &h.blobs, &format!("img{i}.png"), png_bytes(20, 20)).await;
    }

    h.service.start().unwrap();
    assert!(eventually(WAIT, || all_terminal(&h.store)).await);
    h.service.stop(WAIT).await;

    assert_eq!(h.store.count_with_status(TaskStatus::Completed), 3);
    assert!(h.store.peak_processing() <= 2);
    assert!(h.service.stats().peak_in_flight <= 2);
}

// ---------------------------------------------------------------------------
// Test: every task moves pending -> processing -> terminal exactly once
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn status_history_is_monotonic() {
    let h = Harness::new(fast_config(3, 2));
    let mut ids = Vec::new();
    for i in 0..8 {
        let data = if i % 3 == 0 { b"junk".to_vec() } else { png_bytes(16, 16) };
        ids.push(seed_task(&h.store, &h.blobs, &format!("img{i}.png"), data).await.id);
    }

    h.service.start().unwrap();
    // Direct submissions race the dispatcher for the same tasks.
    for task in h.store.tasks() {
        let _ = h.service.submit(task).await;
    }
    assert!(eventually(WAIT, || all_terminal(&h.store)).await);
    h.service.stop(WAIT).await;

    for id in ids {
        let history = h.store.status_history(id);
        assert_eq!(history.len(), 3, "task {id}: {history:?}");
        assert_eq!(history[0], TaskStatus::Pending);
        assert_eq!(history[1], TaskStatus::Processing);
        assert!(history[2].is_terminal());
    }
    assert!(h.store.peak_processing() <= 3);
}

// ---------------------------------------------------------------------------
// Test: direct submission starts work without waiting for the next poll
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submitted_task_skips_the_poll_interval() {
    let config = ProcessingConfig {
        worker_pool_size: 1,
        polling_interval: Duration::from_secs(60),
        task_batch_size: 5,
    };
    let h = Harness::new(config);
    h.service.start().unwrap();
    // Let the immediate first poll run against the empty store.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let task = seed_task(&h.store, &h.blobs, "fresh.png", png_bytes(10, 10)).await;
    assert_eq!(h.service.submit(task.clone()).await, Ok(PushOutcome::Queued));

    assert!(eventually(Duration::from_secs(5), || h.status(task.id) == TaskStatus::Completed).await);
    h.service.stop(WAIT).await;
}

// ---------------------------------------------------------------------------
// Test: a failing poll is retried on the next interval
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_recovers_from_store_errors() {
    let memory = Arc::new(MemoryTaskStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone(), 3));
    let service = ProcessingService::new(
        flaky.clone(),
        blobs.clone(),
        Arc::new(ResizeTransform::default()),
        fast_config(1, 5),
    );
    let task = seed_task(&memory, &blobs, "retry.png", png_bytes(10, 10)).await;

    service.start().unwrap();
    let done = eventually(WAIT, || {
        memory
            .tasks()
            .iter()
            .any(|t| t.id == task.id && t.status == TaskStatus::Completed)
    })
    .await;
    service.stop(WAIT).await;

    assert!(done);
    assert!(flaky.polls() >= 4);
}

// ---------------------------------------------------------------------------
// Test: a transient failure claiming a task leaves it for the next poll
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_claim_leaves_task_pending_for_next_poll() {
    let memory = Arc::new(MemoryTaskStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone(), 0).with_failing_claims(1));
    let service = ProcessingService::new(
        flaky.clone(),
        blobs.clone(),
        Arc::new(ResizeTransform::default()),
        fast_config(1, 5),
    );
    let task = seed_task(&memory, &blobs, "claim.png", png_bytes(10, 10)).await;

    service.start().unwrap();
    let done = eventually(WAIT, || {
        memory
            .tasks()
            .iter()
            .any(|t| t.id == task.id && t.status == TaskStatus::Completed)
    })
    .await;
    service.stop(WAIT).await;

    assert!(done);
    // The rejected claim wrote nothing, so the task was still pending when
    // a later poll handed it out again.
    assert!(service.stats().abandoned >= 1);
    assert_eq!(
        memory.status_history(task.id),
        vec![
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed
        ]
    );
    assert!(flaky.polls() >= 2);
}

// ---------------------------------------------------------------------------
// Test: a lost final status write is contained and the worker carries on
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lost_final_status_write_leaves_task_processing() {
    let memory = Arc::new(MemoryTaskStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone(), 0).with_failing_finishes(1));
    let queue = Arc::new(WorkQueue::new(4));
    let stats = Arc::new(WorkerStats::new());
    let worker = Worker::new(
        1,
        flaky.clone(),
        blobs.clone(),
        Arc::new(ResizeTransform::default()),
        queue.clone(),
        stats.clone(),
    );
    let stuck = seed_task(&memory, &blobs, "stuck.png", png_bytes(10, 10)).await;
    let next = seed_task(&memory, &blobs, "next.png", png_bytes(10, 10)).await;

    assert_eq!(
        worker.handle(stuck.clone()).await,
        TaskOutcome::Unrecorded(TaskStatus::Completed)
    );
    assert_eq!(
        memory.status_history(stuck.id),
        vec![TaskStatus::Pending, TaskStatus::Processing]
    );
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.unrecorded, 1);
    assert_eq!(snapshot.in_flight, 0);

    // The same worker keeps serving the queue.
    let cancel = CancellationToken::new();
    assert_eq!(queue.push(next.clone(), &cancel).await, Ok(PushOutcome::Queued));
    queue.close();
    worker.run().await;

    assert_eq!(
        memory.status_history(next.id),
        vec![
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed
        ]
    );
    assert_eq!(stats.snapshot().completed, 1);
    assert_eq!(stats.snapshot().unrecorded, 1);
}

// ---------------------------------------------------------------------------
// Test: submissions are rejected once shutdown has begun
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_after_stop_is_rejected() {
    let h = Harness::new(fast_config(1, 1));
    h.service.start().unwrap();
    h.service.stop(WAIT).await;

    let task = pending_task(&h.store, "late.png", "late_1.png").await;
    assert_matches!(
        h.service.submit(task.clone()).await,
        Err(SubmitError::ShuttingDown(id)) if id == task.id
    );
    assert_eq!(h.status(task.id), TaskStatus::Pending);
}
