//! Conversion submission and status handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::intake::UploadRequest;
use crate::domain::formats::{INPUT_FORMATS, supported_targets};
use crate::infra::http::error::ApiError;
use crate::infra::http::models::{ConversionResponse, FormatPairings, FormatsResponse};
use crate::infra::http::state::AppState;

/// POST /api/v1/conversions — accept a document and start converting it.
pub async fn submit_conversion(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut filename = None;
    let mut declared_mime = None;
    let mut data: Option<bytes::Bytes> = None;
    let mut target_format: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request("invalid multipart payload", Some(err.to_string())))?
    {
        let name = field.name().map(|value| value.to_string());
        match name.as_deref() {
            Some("file") => {
                filename = field.file_name().map(|value| value.to_string());
                declared_mime = field.content_type().map(|value| value.to_string());
                data = Some(field.bytes().await.map_err(|err| {
                    ApiError::bad_request("failed to read upload", Some(err.to_string()))
                })?);
            }
            Some("target_format") => {
                target_format = Some(field.text().await.map_err(|err| {
                    ApiError::bad_request("failed to read target format", Some(err.to_string()))
                })?);
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("missing file", None))?;
    let data = data.ok_or_else(|| ApiError::bad_request("missing file", None))?;
    let target_format =
        target_format.ok_or_else(|| ApiError::bad_request("missing target format", None))?;

    let job = state
        .intake
        .accept(UploadRequest {
            filename,
            declared_mime,
            target_format,
            data,
        })
        .await?;

    Arc::clone(&state.pipeline).spawn(job.clone());

    let response = ConversionResponse::from_job(&job, OffsetDateTime::now_utc());
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/conversions/{id} — poll a job's status and progress.
pub async fn get_conversion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .tracker
        .get(id)
        .ok_or_else(|| ApiError::not_found("conversion not found"))?;

    Ok(Json(ConversionResponse::from_job(
        &job,
        OffsetDateTime::now_utc(),
    )))
}

/// GET /api/v1/formats — the registry's compatibility table.
pub async fn list_formats() -> Json<FormatsResponse> {
    let formats = INPUT_FORMATS
        .iter()
        .copied()
        .map(|source| FormatPairings {
            source,
            targets: supported_targets(source),
        })
        .collect();

    Json(FormatsResponse { formats })
}
