//! Conversion pipeline: drives one accepted job from `validating` through a
//! terminal state.
//!
//! Each job runs as its own tokio task. The engine subprocess is the only
//! long suspension and is bounded by the configured timeout; every failure
//! path deletes the job's artifacts before the failure is reported, so no
//! partial output ever lingers.

use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::application::retention::RetentionManager;
use crate::application::tracker::{JobTracker, TrackerError};
use crate::config::ConversionSettings;
use crate::domain::formats::engine_for;
use crate::domain::job::{ConversionJob, ErrorKind, JobStatus};
use crate::infra::engines::{EngineError, Engines};
use crate::infra::storage::{ArtifactStorage, ArtifactStorageError};

#[derive(Debug)]
pub struct ConversionPipeline {
    tracker: Arc<JobTracker>,
    storage: Arc<ArtifactStorage>,
    engines: Arc<Engines>,
    retention: Arc<RetentionManager>,
    settings: ConversionSettings,
}

impl ConversionPipeline {
    pub fn new(
        tracker: Arc<JobTracker>,
        storage: Arc<ArtifactStorage>,
        engines: Arc<Engines>,
        retention: Arc<RetentionManager>,
        settings: ConversionSettings,
    ) -> Self {
        Self {
            tracker,
            storage,
            engines,
            retention,
            settings,
        }
    }

    /// Launch the conversion task for an accepted job.
    ///
    /// The task is independent of the submitting request: a client that
    /// disconnects does not cancel the conversion.
    pub fn spawn(self: Arc<Self>, job: ConversionJob) {
        tokio::spawn(async move {
            self.run(job).await;
        });
    }

    async fn run(&self, job: ConversionJob) {
        let job_id = job.id;

        match self.drive(&job).await {
            Ok(()) => {
                counter!("papermill_jobs_succeeded_total").increment(1);
            }
            Err(kind) => {
                counter!("papermill_jobs_failed_total").increment(1);
                if let Err(err) = self.tracker.fail(job_id, kind) {
                    // Only possible if something else already terminated the
                    // job, which would break the single-writer rule.
                    error!(
                        target = "application::pipeline",
                        op = "pipeline::run",
                        job_id = %job_id,
                        error = %err,
                        "Failed to record job failure"
                    );
                }
                // Failed jobs hold no residual value: artifacts go now.
                self.retention.cleanup_now(job_id).await;
            }
        }
    }

    async fn drive(&self, job: &ConversionJob) -> Result<(), ErrorKind> {
        let job_id = job.id;

        self.transition(job_id, JobStatus::Validating)?;
        let source_path = self.storage.source_path(job_id, job.source_format);
        let stored_size = self
            .storage
            .artifact_size(job_id, &source_path)
            .await
            .map_err(storage_failure(job_id))?;
        if stored_size != job.size_bytes {
            error!(
                target = "application::pipeline",
                op = "pipeline::validate",
                job_id = %job_id,
                expected_bytes = job.size_bytes,
                stored_bytes = stored_size,
                "Stored source artifact does not match the accepted upload"
            );
            return Err(ErrorKind::StorageFailure);
        }

        // The guard already proved the pair; resolving again keeps the
        // registry the single authority if the table ever changes.
        let engine = engine_for(job.source_format, job.target_format)
            .ok_or(ErrorKind::UnsupportedConversion)?;

        self.transition(job_id, JobStatus::Converting)?;
        let output_path = self.storage.output_path(job_id, job.target_format);

        let started_at = Instant::now();
        let outcome = self
            .engines
            .convert(engine, &source_path, job.target_format, &output_path)
            .await;
        histogram!("papermill_conversion_ms")
            .record(started_at.elapsed().as_millis() as f64);

        match outcome {
            Ok(()) => {}
            Err(err) => {
                // Full diagnostics stay server-side; clients only ever see
                // the generic failed status.
                error!(
                    target = "application::pipeline",
                    op = "pipeline::convert",
                    job_id = %job_id,
                    engine = engine.as_str(),
                    source_format = job.source_format.as_str(),
                    target_format = job.target_format.as_str(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Conversion engine failed"
                );
                return Err(engine_error_kind(&err));
            }
        }

        let completed_at = OffsetDateTime::now_utc();
        let expires_at = completed_at + self.settings.retention_window;
        self.tracker
            .complete(job_id, completed_at, expires_at)
            .map_err(tracker_failure(job_id))?;
        self.retention.schedule_cleanup(job_id, expires_at);

        info!(
            target = "application::pipeline",
            op = "pipeline::run",
            result = "ok",
            job_id = %job_id,
            engine = engine.as_str(),
            source_format = job.source_format.as_str(),
            target_format = job.target_format.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Conversion finished"
        );

        Ok(())
    }

    fn transition(&self, job_id: Uuid, next: JobStatus) -> Result<(), ErrorKind> {
        self.tracker
            .transition(job_id, next)
            .map(|_| ())
            .map_err(tracker_failure(job_id))
    }
}

fn engine_error_kind(err: &EngineError) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::ConversionTimeout
    } else {
        ErrorKind::EngineFailure
    }
}

fn storage_failure(job_id: Uuid) -> impl FnOnce(ArtifactStorageError) -> ErrorKind {
    move |err| {
        error!(
            target = "application::pipeline",
            op = "pipeline::storage",
            job_id = %job_id,
            error = %err,
            "Artifact storage failure"
        );
        ErrorKind::StorageFailure
    }
}

fn tracker_failure(job_id: Uuid) -> impl FnOnce(TrackerError) -> ErrorKind {
    move |err| {
        error!(
            target = "application::pipeline",
            op = "pipeline::tracker",
            job_id = %job_id,
            error = %err,
            "Job tracker rejected a pipeline transition"
        );
        ErrorKind::StorageFailure
    }
}
