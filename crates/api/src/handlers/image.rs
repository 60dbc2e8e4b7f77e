//! Handlers for image upload, task status and image download.

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use imgproc_core::naming::content_type_for;
use imgproc_core::status::TaskStatus;
use imgproc_core::types::{DbId, Timestamp};
use imgproc_core::upload::validate_image_filename;
use imgproc_db::models::processed_image::ProcessedImage;
use imgproc_db::models::task::{NewTask, Task};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";

/// Body of a `202 Accepted` upload response.
#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub id: DbId,
    pub status: TaskStatus,
    pub created_at: Timestamp,
}

/// A task together with its derivative, once one exists.
#[derive(Debug, Serialize)]
pub struct TaskStatusView {
    #[serde(flatten)]
    pub task: Task,
    pub processed_image: Option<ProcessedImage>,
}

// ── Upload ───────────────────────────────────────────────────────────

/// POST /api/v1/image/upload
///
/// Stores the original, records a pending task and hands it straight to the
/// processing service. The task is polled up later if the hand-off is
/// rejected.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadAccepted>>)> {
    let (filename, data) = read_image_field(&mut multipart).await?;
    validate_image_filename(&filename)?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".into()));
    }

    let size = data.len();
    let storage_key = state.blobs.save(&filename, data.to_vec()).await?;

    let new_task = NewTask {
        original_filename: filename,
        storage_key: storage_key.clone(),
    };
    let task = match state.tasks.create_task(&new_task).await {
        Ok(task) => task,
        Err(e) => {
            if let Err(cleanup) = state.blobs.delete(&storage_key).await {
                tracing::warn!(
                    storage_key = %storage_key,
                    error = %cleanup,
                    "Failed to remove orphaned upload",
                );
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        task_id = task.id,
        storage_key = %task.storage_key,
        bytes = size,
        "Image uploaded, task created",
    );

    let accepted = UploadAccepted {
        id: task.id,
        status: task.status,
        created_at: task.created_at,
    };

    if let Err(e) = state.processor.submit(task).await {
        tracing::warn!(error = %e, "Direct hand-off rejected, task left for the dispatcher");
    }

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

/// Pull the `image` field out of the multipart body.
async fn read_image_field(multipart: &mut Multipart) -> AppResult<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok((filename, data));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{IMAGE_FIELD}'"
    )))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// GET /api/v1/image/status/{task_id}
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<Json<DataResponse<TaskStatusView>>> {
    let task = state.tasks.get_task_by_id(task_id).await?;

    let processed_image = match state.tasks.get_processed_image(task_id).await {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(task_id, error = %e, "Failed to load processed image");
            None
        }
    };

    Ok(Json(DataResponse {
        data: TaskStatusView {
            task,
            processed_image,
        },
    }))
}

// ── Download ─────────────────────────────────────────────────────────

/// GET /api/v1/image/{image_key}
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_key): Path<String>,
) -> AppResult<Response> {
    let bytes = state.blobs.get(&image_key).await?;

    Ok((
        [
            (CONTENT_TYPE, content_type_for(&image_key)),
            (CACHE_CONTROL, "public, max-age=86400"),
        ],
        bytes,
    )
        .into_response())
}
