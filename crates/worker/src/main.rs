use std::sync::Arc;
use std::time::Duration;

use imgproc_core::env;
use imgproc_pipeline::ResizeTransform;
use imgproc_storage::{build_blob_store, StorageConfig};
use imgproc_worker::signal::shutdown_signal;
use imgproc_worker::{PgTaskStore, ProcessingConfig, ProcessingService, StopOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgproc_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

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

    let storage_config = StorageConfig::from_env().expect("Invalid storage configuration");
    let blobs = build_blob_store(&storage_config)
        .await
        .expect("Failed to initialise blob store");

    let shutdown_timeout = Duration::from_secs(env::parse_or("SHUTDOWN_TIMEOUT_SECS", 30u64));

    let service = ProcessingService::new(
        Arc::new(PgTaskStore::new(pool)),
        blobs,
        Arc::new(ResizeTransform::default()),
        ProcessingConfig::from_env(),
    );
    service
        .start()
        .expect("Processing service started twice");

    shutdown_signal().await;

    if service.stop(shutdown_timeout).await == StopOutcome::TimedOut {
        tracing::warn!("Exiting with tasks still in flight");
    }
}
