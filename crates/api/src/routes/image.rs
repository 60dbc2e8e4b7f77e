//! Route definitions for the `/image` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::image;
use crate::state::AppState;

/// Routes mounted at `/image`.
///
/// ```text
/// POST   /upload              -> upload_image
/// GET    /status/{task_id}    -> get_task_status
/// GET    /{image_key}         -> get_image
/// ```
///
/// The upload route replaces axum's default body limit with
/// `max_upload_bytes`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(image::upload_image)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload_bytes)),
        )
        .route("/status/{task_id}", get(image::get_task_status))
        .route("/{image_key}", get(image::get_image))
}
