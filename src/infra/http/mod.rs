pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};

pub use state::AppState;

use middleware::{log_responses, set_request_context};

/// Slack on top of the upload ceiling so multipart framing does not trip the
/// transport-level body limit before the guard can reject with a typed error.
const BODY_LIMIT_SLACK_BYTES: usize = 2 * 1024 * 1024;

pub fn build_router(state: AppState, max_upload_bytes: u64) -> Router {
    let body_limit = (max_upload_bytes as usize).saturating_add(BODY_LIMIT_SLACK_BYTES);

    Router::new()
        .route("/api/v1/conversions", post(handlers::submit_conversion))
        .route("/api/v1/conversions/{id}", get(handlers::get_conversion))
        .route(
            "/api/v1/conversions/{id}/download",
            get(handlers::download_conversion),
        )
        .route("/api/v1/formats", get(handlers::list_formats))
        .route("/_health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}
