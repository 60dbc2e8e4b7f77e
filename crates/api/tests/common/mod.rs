#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imgproc_api::config::ServerConfig;
use imgproc_api::router::build_app_router;
use imgproc_api::state::AppState;
use imgproc_pipeline::ResizeTransform;
use imgproc_storage::MemoryBlobStore;
use imgproc_worker::{MemoryTaskStore, ProcessingConfig, ProcessingService, TaskStore};
use tower::ServiceExt;

const BOUNDARY: &str = "imgproc-test-boundary";

/// Build a test `ServerConfig` with safe defaults and a 1 MiB upload limit.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1 << 20,
    }
}

/// Router plus handles on the in-memory stores behind it.
pub struct TestApp {
    pub app: Router,
    pub tasks: Arc<MemoryTaskStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub processor: Arc<ProcessingService>,
}

/// Full application router over in-memory stores, with the processing
/// service running.
pub fn build_test_app() -> TestApp {
    let tasks = Arc::new(MemoryTaskStore::new());
    let (app, blobs, processor) = build_router(tasks.clone(), test_config());
    processor.start().unwrap();
    TestApp {
        app,
        tasks,
        blobs,
        processor,
    }
}

/// Router over `tasks` and a fresh in-memory blob store. The processing
/// service is returned unstarted.
pub fn build_router(
    tasks: Arc<dyn TaskStore>,
    config: ServerConfig,
) -> (Router, Arc<MemoryBlobStore>, Arc<ProcessingService>) {
    let blobs = Arc::new(MemoryBlobStore::new());
    let processor = Arc::new(ProcessingService::new(
        Arc::clone(&tasks),
        blobs.clone(),
        Arc::new(ResizeTransform::default()),
        ProcessingConfig {
            worker_pool_size: 2,
            polling_interval: Duration::from_millis(20),
            task_batch_size: 4,
        },
    ));

    let state = AppState {
        tasks,
        blobs: blobs.clone(),
        processor: Arc::clone(&processor),
        config: Arc::new(config.clone()),
    };

    (build_app_router(state, &config), blobs, processor)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a single-file multipart body.
pub async fn post_file(
    app: Router,
    uri: &str,
    field: &str,
    filename: &str,
    data: &[u8],
) -> Response<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Encode a solid `width x height` PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 90]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
