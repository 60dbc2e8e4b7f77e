use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use imgproc_pipeline::ResizeTransform;
use imgproc_storage::{build_blob_store, StorageConfig};
use imgproc_worker::signal::shutdown_signal;
use imgproc_worker::{PgTaskStore, ProcessingConfig, ProcessingService, StopOutcome, TaskStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgproc_api::config::ServerConfig;
use imgproc_api::router::build_app_router;
use imgproc_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "imgproc_api=debug,imgproc_worker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = imgproc_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    imgproc_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    imgproc_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Blob storage ---
    let storage_config = StorageConfig::from_env().expect("Invalid storage configuration");
    let blobs = build_blob_store(&storage_config)
        .await
        .expect("Failed to initialise blob store");

    // --- Processing service ---
    let tasks: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool));
    let processor = Arc::new(ProcessingService::new(
        Arc::clone(&tasks),
        Arc::clone(&blobs),
        Arc::new(ResizeTransform::default()),
        ProcessingConfig::from_env(),
    ));
    processor
        .start()
        .expect("Processing service started twice");

    // --- App state ---
    let state = AppState {
        tasks,
        blobs,
        processor: Arc::clone(&processor),
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining processing service");

    let deadline = Duration::from_secs(config.shutdown_timeout_secs);
    if processor.stop(deadline).await == StopOutcome::TimedOut {
        tracing::warn!("Exiting with tasks still in flight");
    }

    tracing::info!("Graceful shutdown complete");
}
