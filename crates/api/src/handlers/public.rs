use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;

#[derive(Debug, Serialize)]
pub struct Pong {
    pub message: &'static str,
}

/// GET /api/v1/public/ping
pub async fn ping() -> Json<DataResponse<Pong>> {
    Json(DataResponse {
        data: Pong { message: "pong" },
    })
}
