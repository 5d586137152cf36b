use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::domain::formats::DocumentFormat;
use crate::domain::job::{ConversionJob, JobStatus};

/// Client-facing snapshot of a conversion job.
///
/// Failure detail is deliberately generic: engine diagnostics never leave
/// the server.
#[derive(Debug, Serialize)]
pub struct ConversionResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub source_format: DocumentFormat,
    pub target_format: DocumentFormat,
    pub size_bytes: u64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl ConversionResponse {
    pub fn from_job(job: &ConversionJob, now: OffsetDateTime) -> Self {
        let download_url = job
            .is_downloadable(now)
            .then(|| format!("/api/v1/conversions/{}/download", job.id));

        let message = match job.status {
            JobStatus::Failed => {
                Some("Conversion failed. Check the document and submit it again.")
            }
            JobStatus::Expired => Some("The converted document has expired."),
            _ => None,
        };

        Self {
            id: job.id,
            status: job.status,
            progress_percent: job.status.progress_percent(),
            source_format: job.source_format,
            target_format: job.target_format,
            size_bytes: job.size_bytes,
            created_at: rfc3339(job.created_at),
            expires_at: job.expires_at.map(rfc3339),
            download_url,
            message,
        }
    }
}

fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_default()
}

/// One row of the compatibility table served to the format picker.
#[derive(Debug, Serialize)]
pub struct FormatPairings {
    pub source: DocumentFormat,
    pub targets: Vec<DocumentFormat>,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<FormatPairings>,
}
