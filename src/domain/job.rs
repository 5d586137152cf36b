//! Conversion job lifecycle model.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::formats::DocumentFormat;

/// Lifecycle state of a conversion job.
///
/// Transitions are monotonic along `Received → Validating → Converting →
/// {Succeeded | Failed}`. `Expired` is reachable only from a terminal state
/// and only through the retention manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Validating,
    Converting,
    Succeeded,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Validating => "validating",
            JobStatus::Converting => "converting",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
        }
    }

    /// Terminal states hold no further pipeline work.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Expired
        )
    }

    /// Whether the pipeline may move a job from `self` to `next`.
    pub fn can_transition(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Received, JobStatus::Validating)
                | (JobStatus::Received, JobStatus::Failed)
                | (JobStatus::Validating, JobStatus::Converting)
                | (JobStatus::Validating, JobStatus::Failed)
                | (JobStatus::Converting, JobStatus::Succeeded)
                | (JobStatus::Converting, JobStatus::Failed)
                | (JobStatus::Succeeded, JobStatus::Expired)
                | (JobStatus::Failed, JobStatus::Expired)
        )
    }

    /// Coarse completion estimate driving the client progress indicator.
    pub fn progress_percent(self) -> u8 {
        match self {
            JobStatus::Received => 10,
            JobStatus::Validating => 25,
            JobStatus::Converting => 60,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Expired => 100,
        }
    }
}

/// Why a job failed. Stored on the job, surfaced to clients only as a
/// generic failure; the precise kind drives server-side logging and the
/// HTTP status of synchronous rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileTooLarge,
    UnsupportedFormat,
    UnsupportedConversion,
    ConversionTimeout,
    EngineFailure,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FileTooLarge => "file_too_large",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::UnsupportedConversion => "unsupported_conversion",
            ErrorKind::ConversionTimeout => "conversion_timeout",
            ErrorKind::EngineFailure => "engine_failure",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

/// One requested format transformation and its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: Uuid,
    pub source_format: DocumentFormat,
    pub target_format: DocumentFormat,
    pub original_filename: String,
    pub size_bytes: u64,
    pub status: JobStatus,
    pub error_kind: Option<ErrorKind>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
}

impl ConversionJob {
    pub fn new(
        source_format: DocumentFormat,
        target_format: DocumentFormat,
        original_filename: String,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_format,
            target_format,
            original_filename,
            size_bytes,
            status: JobStatus::Received,
            error_kind: None,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
            expires_at: None,
        }
    }

    /// Whether the converted artifact may still be served.
    pub fn is_downloadable(&self, now: OffsetDateTime) -> bool {
        self.status == JobStatus::Succeeded
            && self.expires_at.is_some_and(|expires_at| now < expires_at)
    }
}
