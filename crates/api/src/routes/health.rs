use axum::extract::State;
use axum::{routing::get, Json, Router};
use imgproc_worker::{ServiceState, StatsSnapshot};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` while the processing service is running, `degraded` otherwise.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub processing: ProcessingHealth,
}

#[derive(Serialize)]
pub struct ProcessingHealth {
    pub state: ServiceState,
    /// Tasks held by the work queue, including blocked submissions.
    pub queued: usize,
    pub stats: StatsSnapshot,
}

/// GET /health -- returns service and processing health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let processing_state = state.processor.state();
    let status = if processing_state == ServiceState::Running {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        processing: ProcessingHealth {
            state: processing_state,
            queued: state.processor.queued(),
            stats: state.processor.stats(),
        },
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
