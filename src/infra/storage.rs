//! Job-scoped artifact storage.
//!
//! Every job owns one directory named after its UUID; the uploaded source and
//! the converted output live inside it and nowhere else. Paths are never
//! derived from client input, so one job cannot address another job's files.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::domain::formats::DocumentFormat;

const SOURCE_STEM: &str = "source";
const OUTPUT_STEM: &str = "output";

/// Errors that can occur while interacting with the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactStorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("artifact payload is empty")]
    EmptyPayload,
    #[error("artifact for job {job_id} is missing")]
    Missing { job_id: Uuid },
    #[error("artifact directory for job {job_id} survived deletion")]
    DeletionUnverified { job_id: Uuid },
}

/// Metadata describing a stored artifact.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Filesystem-backed, job-scoped artifact storage.
#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory owned by the given job.
    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Location of the uploaded source document.
    pub fn source_path(&self, job_id: Uuid, format: DocumentFormat) -> PathBuf {
        self.job_dir(job_id)
            .join(format!("{SOURCE_STEM}.{}", format.extension()))
    }

    /// Location the converted output is written to.
    pub fn output_path(&self, job_id: Uuid, format: DocumentFormat) -> PathBuf {
        self.job_dir(job_id)
            .join(format!("{OUTPUT_STEM}.{}", format.extension()))
    }

    /// Persist the uploaded payload into the job's directory.
    pub async fn store_source(
        &self,
        job_id: Uuid,
        format: DocumentFormat,
        data: Bytes,
    ) -> Result<StoredArtifact, ArtifactStorageError> {
        if data.is_empty() {
            return Err(ArtifactStorageError::EmptyPayload);
        }

        let path = self.source_path(job_id, format);
        fs::create_dir_all(self.job_dir(job_id)).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let checksum = hex::encode(hasher.finalize());

        Ok(StoredArtifact {
            path,
            checksum,
            size_bytes: data.len() as u64,
        })
    }

    /// Size of a stored artifact, or `Missing` when it is gone.
    pub async fn artifact_size(
        &self,
        job_id: Uuid,
        path: &Path,
    ) -> Result<u64, ArtifactStorageError> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactStorageError::Missing { job_id })
            }
            Err(err) => Err(ArtifactStorageError::Io(err)),
        }
    }

    /// Read the converted output into memory for delivery.
    pub async fn read_output(
        &self,
        job_id: Uuid,
        format: DocumentFormat,
    ) -> Result<Bytes, ArtifactStorageError> {
        let path = self.output_path(job_id, format);
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactStorageError::Missing { job_id })
            }
            Err(err) => Err(ArtifactStorageError::Io(err)),
        }
    }

    /// Delete every artifact owned by the job and verify the directory is gone.
    ///
    /// A directory that was already absent counts as success.
    pub async fn delete_job(&self, job_id: Uuid) -> Result<(), ArtifactStorageError> {
        let dir = self.job_dir(job_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(ArtifactStorageError::Io(err)),
        }

        match fs::metadata(&dir).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Ok(_) => Err(ArtifactStorageError::DeletionUnverified { job_id }),
            Err(err) => Err(ArtifactStorageError::Io(err)),
        }
    }
}

/// Reduce a client-supplied filename to a safe display name for delivery.
pub fn sanitize_filename(original: &str, format: DocumentFormat) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "document".to_string();
    }

    format!("{base}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, ArtifactStorage) {
        let dir = TempDir::new().expect("temp dir");
        let storage = ArtifactStorage::new(dir.path().join("artifacts")).expect("storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn stores_and_deletes_job_scoped_artifacts() {
        let (_guard, storage) = storage();
        let job_id = Uuid::new_v4();

        let stored = storage
            .store_source(job_id, DocumentFormat::Txt, Bytes::from_static(b"hello"))
            .await
            .expect("stored");
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(stored.path, storage.source_path(job_id, DocumentFormat::Txt));
        assert!(stored.path.exists());

        storage.delete_job(job_id).await.expect("deleted");
        assert!(!storage.job_dir(job_id).exists());

        // Deleting an absent job is not an error.
        storage.delete_job(job_id).await.expect("idempotent delete");
    }

    #[tokio::test]
    async fn empty_payloads_are_rejected() {
        let (_guard, storage) = storage();
        let err = storage
            .store_source(Uuid::new_v4(), DocumentFormat::Txt, Bytes::new())
            .await
            .expect_err("empty payload");
        assert!(matches!(err, ArtifactStorageError::EmptyPayload));
    }

    #[tokio::test]
    async fn missing_output_reads_as_missing() {
        let (_guard, storage) = storage();
        let job_id = Uuid::new_v4();
        let err = storage
            .read_output(job_id, DocumentFormat::Pdf)
            .await
            .expect_err("missing");
        assert!(matches!(err, ArtifactStorageError::Missing { .. }));
    }

    #[test]
    fn sanitize_filename_slugs_and_renames_extension() {
        assert_eq!(
            sanitize_filename("Quarterly Report (final).docx", DocumentFormat::Pdf),
            "quarterly-report-final.pdf"
        );
        assert_eq!(
            sanitize_filename("../../etc/passwd", DocumentFormat::Docx),
            "passwd.docx"
        );
        assert_eq!(sanitize_filename("", DocumentFormat::Odt), "document.odt");
    }
}
