use axum::routing::get;
use axum::Router;

use crate::handlers::public;
use crate::state::AppState;

/// Routes mounted at `/public`.
///
/// ```text
/// GET    /ping            -> ping
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/ping", get(public::ping))
}
