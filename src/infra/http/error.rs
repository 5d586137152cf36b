use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::intake::IntakeError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const FILE_TOO_LARGE: &str = "file_too_large";
    pub const UNSUPPORTED_FORMAT: &str = "unsupported_format";
    pub const UNSUPPORTED_CONVERSION: &str = "unsupported_conversion";
    pub const NOT_FOUND: &str = "not_found";
    pub const STORAGE: &str = "storage_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match &err {
            IntakeError::FileTooLarge { .. } => Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::FILE_TOO_LARGE,
                "File exceeds the upload ceiling",
                Some(err.to_string()),
            ),
            IntakeError::UnsupportedFormat { .. } => Self::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                codes::UNSUPPORTED_FORMAT,
                "File is not an accepted document format",
                Some(err.to_string()),
            ),
            IntakeError::UnsupportedConversion { .. } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                codes::UNSUPPORTED_CONVERSION,
                "Requested conversion is not supported",
                Some(err.to_string()),
            ),
            // Storage details stay in server logs.
            IntakeError::Storage(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::STORAGE,
                "Failed to store the upload",
                None,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        ErrorReport::from_message(
            "infra::http::error",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}
