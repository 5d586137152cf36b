use axum::http::StatusCode;

/// GET /_health — liveness probe.
pub async fn health_check() -> StatusCode {
    StatusCode::NO_CONTENT
}
