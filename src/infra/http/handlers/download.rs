//! Artifact delivery.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{
    HeaderValue, StatusCode,
    header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
};
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::infra::http::error::{ApiError, codes};
use crate::infra::http::state::AppState;
use crate::infra::storage::{ArtifactStorageError, sanitize_filename};

/// GET /api/v1/conversions/{id}/download — stream the converted artifact.
///
/// Served only while the job is `succeeded` and inside its retention window;
/// a delivery never resets or extends that window. Everything else — unknown
/// job, failed job, lapsed window — is the same `not_found`.
pub async fn download_conversion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let now = OffsetDateTime::now_utc();
    let job = state
        .tracker
        .get(id)
        .filter(|job| job.is_downloadable(now))
        .ok_or_else(|| ApiError::not_found("conversion not found or no longer available"))?;

    let bytes = state
        .storage
        .read_output(id, job.target_format)
        .await
        .map_err(|err| match err {
            ArtifactStorageError::Missing { .. } => {
                ApiError::not_found("conversion not found or no longer available")
            }
            other => {
                error!(
                    target = "infra::http::download",
                    op = "download::read_output",
                    job_id = %id,
                    error = %other,
                    "Failed to read converted artifact"
                );
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::STORAGE,
                    "Failed to read converted document",
                    None,
                )
            }
        })?;

    info!(
        target = "infra::http::download",
        op = "download::serve",
        job_id = %id,
        target_format = job.target_format.as_str(),
        size_bytes = bytes.len(),
        "Converted artifact delivered"
    );

    let output_path = state.storage.output_path(id, job.target_format);
    let mime = mime_guess::from_path(&output_path).first_or_octet_stream();
    let attachment = format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&job.original_filename, job.target_format)
    );

    let mut response = Response::new(Body::from(bytes.clone()));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&attachment) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok(response.into_response())
}
