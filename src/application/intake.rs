//! Upload guard.
//!
//! Validates an inbound file against the size ceiling, the format allow-list
//! (declared extension and MIME plus magic-byte sniffing) and the registry's
//! compatibility table. Validation is a hard gate: nothing is persisted and
//! no job exists until every check has passed, and a rejected upload leaves
//! no trace.

use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::retention::withdraw_job;
use crate::application::tracker::JobTracker;
use crate::domain::formats::{DocumentFormat, engine_for, sniff_family};
use crate::domain::job::{ConversionJob, ErrorKind};
use crate::infra::storage::{ArtifactStorage, ArtifactStorageError};
use crate::util::bytes::format_bytes;

/// Everything the guard needs to know about one upload.
#[derive(Debug)]
pub struct UploadRequest {
    pub filename: String,
    pub declared_mime: Option<String>,
    pub target_format: String,
    pub data: Bytes,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("file exceeds the {ceiling} upload ceiling")]
    FileTooLarge { ceiling: String },
    #[error("unsupported document format: {detail}")]
    UnsupportedFormat { detail: String },
    #[error("conversion `{from_format}` to `{target}` is not supported")]
    UnsupportedConversion { from_format: String, target: String },
    #[error("failed to persist the upload")]
    Storage(#[from] ArtifactStorageError),
}

impl IntakeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntakeError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            IntakeError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            IntakeError::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            IntakeError::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    fn unsupported_format(detail: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            detail: detail.into(),
        }
    }
}

#[derive(Debug)]
pub struct IntakeService {
    tracker: Arc<JobTracker>,
    storage: Arc<ArtifactStorage>,
    max_upload_bytes: NonZeroU64,
}

impl IntakeService {
    pub fn new(
        tracker: Arc<JobTracker>,
        storage: Arc<ArtifactStorage>,
        max_upload_bytes: NonZeroU64,
    ) -> Self {
        Self {
            tracker,
            storage,
            max_upload_bytes,
        }
    }

    /// Validate the upload and, on success, register the job and persist the
    /// source bytes into the job's own storage directory.
    pub async fn accept(&self, upload: UploadRequest) -> Result<ConversionJob, IntakeError> {
        let outcome = self.validate_and_register(upload).await;
        if let Err(err) = &outcome {
            counter!("papermill_jobs_rejected_total").increment(1);
            warn!(
                target = "application::intake",
                op = "intake::accept",
                result = "rejected",
                reason = err.kind().as_str(),
                "Upload rejected"
            );
        }
        outcome
    }

    async fn validate_and_register(
        &self,
        upload: UploadRequest,
    ) -> Result<ConversionJob, IntakeError> {
        let size_bytes = upload.data.len() as u64;
        if size_bytes > self.max_upload_bytes.get() {
            return Err(IntakeError::FileTooLarge {
                ceiling: format_bytes(self.max_upload_bytes.get()),
            });
        }

        let source_format = declared_format(&upload.filename, upload.declared_mime.as_deref())?;

        match sniff_family(&upload.data) {
            Some(family) if family == source_format.family() => {}
            Some(_) => {
                return Err(IntakeError::unsupported_format(format!(
                    "file content does not look like `{}`",
                    source_format.as_str()
                )));
            }
            None => {
                return Err(IntakeError::unsupported_format(
                    "file content matches no supported document format",
                ));
            }
        }

        let target_format = DocumentFormat::from_extension(&upload.target_format).ok_or_else(|| {
            IntakeError::UnsupportedConversion {
                from_format: source_format.as_str().to_string(),
                target: upload.target_format.to_ascii_lowercase(),
            }
        })?;

        if engine_for(source_format, target_format).is_none() {
            return Err(IntakeError::UnsupportedConversion {
                from_format: source_format.as_str().to_string(),
                target: target_format.as_str().to_string(),
            });
        }

        let job = ConversionJob::new(
            source_format,
            target_format,
            upload.filename.clone(),
            size_bytes,
        );
        self.tracker.insert(job.clone());

        let stored = match self
            .storage
            .store_source(job.id, source_format, upload.data)
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                withdraw_job(&self.tracker, &self.storage, job.id).await;
                return Err(IntakeError::Storage(err));
            }
        };

        counter!("papermill_jobs_submitted_total").increment(1);
        info!(
            target = "application::intake",
            op = "intake::accept",
            result = "ok",
            job_id = %job.id,
            source_format = source_format.as_str(),
            target_format = target_format.as_str(),
            size_bytes,
            checksum = %stored.checksum,
            "Upload accepted"
        );

        Ok(job)
    }
}

/// Resolve the declared source format from the filename extension and, when
/// present, the declared MIME type. The two must agree.
fn declared_format(
    filename: &str,
    declared_mime: Option<&str>,
) -> Result<DocumentFormat, IntakeError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|value| value.to_str())
        .ok_or_else(|| IntakeError::unsupported_format("filename carries no extension"))?;

    let from_extension = DocumentFormat::from_extension(extension).ok_or_else(|| {
        IntakeError::unsupported_format(format!(
            "extension `.{}` is not an accepted input format",
            extension.to_ascii_lowercase()
        ))
    })?;

    match declared_mime {
        // Browsers fall back to the generic type for anything exotic.
        None | Some("application/octet-stream") => Ok(from_extension),
        Some(mime) => match DocumentFormat::from_mime(mime) {
            Some(from_mime) if from_mime == from_extension => Ok(from_extension),
            Some(from_mime) => Err(IntakeError::unsupported_format(format!(
                "declared type `{}` disagrees with extension `.{}`",
                from_mime.as_str(),
                from_extension.as_str()
            ))),
            None => Err(IntakeError::unsupported_format(format!(
                "declared type `{mime}` is not an accepted input format"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOCX_MIME: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    fn service(max_upload_bytes: u64) -> (TempDir, Arc<JobTracker>, Arc<ArtifactStorage>, IntakeService) {
        let dir = TempDir::new().expect("temp dir");
        let tracker = Arc::new(JobTracker::new());
        let storage =
            Arc::new(ArtifactStorage::new(dir.path().join("artifacts")).expect("storage"));
        let intake = IntakeService::new(
            Arc::clone(&tracker),
            Arc::clone(&storage),
            NonZeroU64::new(max_upload_bytes).expect("nonzero"),
        );
        (dir, tracker, storage, intake)
    }

    fn docx_upload(target: &str) -> UploadRequest {
        UploadRequest {
            filename: "report.docx".to_string(),
            declared_mime: Some(DOCX_MIME.to_string()),
            target_format: target.to_string(),
            data: Bytes::from_static(b"PK\x03\x04docx-ish bytes"),
        }
    }

    #[tokio::test]
    async fn accepts_a_well_formed_docx_to_pdf_upload() {
        let (_guard, tracker, storage, intake) = service(1024);

        let job = intake.accept(docx_upload("pdf")).await.expect("accepted");
        assert_eq!(job.source_format, DocumentFormat::Docx);
        assert_eq!(job.target_format, DocumentFormat::Pdf);

        // Registered and persisted under the job's own directory.
        assert!(tracker.get(job.id).is_some());
        assert!(storage.source_path(job.id, DocumentFormat::Docx).exists());
    }

    #[tokio::test]
    async fn oversize_uploads_are_rejected_without_a_job() {
        let (_guard, tracker, storage, intake) = service(8);

        let err = intake.accept(docx_upload("pdf")).await.expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);

        assert!(tracker.lapsed(time::OffsetDateTime::now_utc()).is_empty());
        assert_eq!(
            std::fs::read_dir(storage.job_dir(uuid::Uuid::nil()).parent().unwrap())
                .expect("storage root")
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported_format() {
        let (_guard, _tracker, _storage, intake) = service(1024);

        let mut upload = docx_upload("pdf");
        upload.filename = "malware.exe".to_string();
        upload.declared_mime = None;
        let err = intake.accept(upload).await.expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn sniff_disagreement_is_unsupported_format() {
        let (_guard, _tracker, _storage, intake) = service(1024);

        let mut upload = docx_upload("pdf");
        // Declared DOCX but the payload is a PDF.
        upload.data = Bytes::from_static(b"%PDF-1.7 content");
        let err = intake.accept(upload).await.expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn mime_extension_disagreement_is_unsupported_format() {
        let (_guard, _tracker, _storage, intake) = service(1024);

        let mut upload = docx_upload("pdf");
        upload.declared_mime = Some("application/pdf".to_string());
        let err = intake.accept(upload).await.expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn unknown_target_is_unsupported_conversion() {
        let (_guard, _tracker, _storage, intake) = service(1024);

        let err = intake
            .accept(docx_upload("exe"))
            .await
            .expect_err("unsupported target");
        assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
    }

    #[tokio::test]
    async fn unlisted_pair_is_unsupported_conversion() {
        let (_guard, _tracker, _storage, intake) = service(1024);

        let mut upload = docx_upload("odt");
        upload.filename = "scan.pdf".to_string();
        upload.declared_mime = Some("application/pdf".to_string());
        upload.data = Bytes::from_static(b"%PDF-1.7 content");
        let err = intake.accept(upload).await.expect_err("pair not listed");
        assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
    }

    #[tokio::test]
    async fn identical_uploads_produce_independent_jobs() {
        let (_guard, _tracker, storage, intake) = service(1024);

        let first = intake.accept(docx_upload("pdf")).await.expect("first");
        let second = intake.accept(docx_upload("pdf")).await.expect("second");

        assert_ne!(first.id, second.id);
        assert!(storage.source_path(first.id, DocumentFormat::Docx).exists());
        assert!(storage.source_path(second.id, DocumentFormat::Docx).exists());
    }
}
