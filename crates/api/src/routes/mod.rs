pub mod health;
pub mod image;
pub mod public;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /public/ping                      liveness ping
///
/// /image/upload                     upload an image (POST, multipart)
/// /image/status/{task_id}           task status
/// /image/{image_key}                stored image bytes
/// ```
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .nest("/public", public::router())
        .nest("/image", image::router(max_upload_bytes))
}
