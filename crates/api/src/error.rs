use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imgproc_core::error::CoreError;
use imgproc_storage::BlobError;
use imgproc_worker::StoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of the lower layers and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imgproc_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A task store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blob store error.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        INTERNAL_MESSAGE.to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- Task store ---
            AppError::Store(err) => match err {
                StoreError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Task with id {id} not found"),
                ),
                StoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                StoreError::Database(db) => classify_sqlx_error(db),
                StoreError::Timeout { .. } | StoreError::Unavailable(_) => {
                    tracing::error!(error = %err, "Task store unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "SERVICE_UNAVAILABLE",
                        "Task store is temporarily unavailable".to_string(),
                    )
                }
            },

            // --- Blob store ---
            AppError::Blob(err) => match err {
                BlobError::NotFound(key) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Image {key} not found"),
                ),
                BlobError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", err.to_string()),
                BlobError::Config(_) | BlobError::Io(_) | BlobError::Backend(_) => {
                    tracing::error!(error = %err, "Blob store error");
                    internal()
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// `RowNotFound` maps to 404; everything else to 500 with a sanitized
/// message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
