//! Artifact retention and cleanup.
//!
//! Succeeded jobs keep their artifacts for one retention window and are then
//! expired; failed jobs are cleaned immediately. Each succeeded job gets its
//! own expiry timer, and a periodic sweep re-checks the tracker so expiry
//! does not depend on any single timer task surviving. Cleanup trouble is
//! logged for operator follow-up and never fails a user-facing request.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::tracker::JobTracker;
use crate::infra::storage::ArtifactStorage;

#[derive(Debug)]
pub struct RetentionManager {
    storage: Arc<ArtifactStorage>,
    tracker: Arc<JobTracker>,
}

impl RetentionManager {
    pub fn new(storage: Arc<ArtifactStorage>, tracker: Arc<JobTracker>) -> Self {
        Self { storage, tracker }
    }

    /// Schedule deletion of the job's artifacts at `expires_at`.
    pub fn schedule_cleanup(&self, job_id: Uuid, expires_at: OffsetDateTime) {
        let storage = Arc::clone(&self.storage);
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            let wait = expires_at - OffsetDateTime::now_utc();
            if wait.is_positive() {
                tokio::time::sleep(wait.unsigned_abs()).await;
            }
            expire_job(&storage, &tracker, job_id).await;
        });
    }

    /// Delete the job's artifacts right now. Used on every failure path;
    /// the job record (if any) keeps its failed status.
    pub async fn cleanup_now(&self, job_id: Uuid) {
        delete_artifacts(&self.storage, job_id).await;
    }

    /// Expire a terminal job: delete artifacts, then flip it to `expired`.
    pub async fn expire(&self, job_id: Uuid) {
        expire_job(&self.storage, &self.tracker, job_id).await;
    }

    /// Run the periodic sweep that expires lapsed jobs whose timers died.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                let lapsed = tracker.lapsed(OffsetDateTime::now_utc());
                for job_id in lapsed {
                    expire_job(&storage, &tracker, job_id).await;
                }
            }
        })
    }
}

async fn expire_job(storage: &ArtifactStorage, tracker: &JobTracker, job_id: Uuid) {
    // The sweep and the per-job timer can race here; whichever loses the
    // transition leaves the artifacts deleted and changes nothing else.
    delete_artifacts(storage, job_id).await;

    match tracker.expire(job_id) {
        Ok(_) => {
            counter!("papermill_jobs_expired_total").increment(1);
            info!(
                target = "application::retention",
                op = "retention::expire",
                job_id = %job_id,
                "Retention window lapsed; artifacts removed"
            );
        }
        Err(err) => {
            // Already expired or gone; nothing left to guarantee.
            info!(
                target = "application::retention",
                op = "retention::expire",
                job_id = %job_id,
                detail = %err,
                "Expiry transition skipped"
            );
        }
    }
}

async fn delete_artifacts(storage: &ArtifactStorage, job_id: Uuid) {
    match storage.delete_job(job_id).await {
        Ok(()) => {}
        Err(err) => {
            counter!("papermill_artifact_delete_failures_total").increment(1);
            error!(
                target = "application::retention",
                op = "retention::delete_artifacts",
                job_id = %job_id,
                error = %err,
                "Artifact deletion could not be verified"
            );
        }
    }
}

/// Cleanup used by intake when persisting an accepted upload fails: the job
/// is withdrawn from the tracker and any partial artifacts are removed, so a
/// rejected upload leaves no trace.
pub async fn withdraw_job(tracker: &JobTracker, storage: &ArtifactStorage, job_id: Uuid) {
    tracker.remove(job_id);
    if let Err(err) = storage.delete_job(job_id).await {
        counter!("papermill_artifact_delete_failures_total").increment(1);
        warn!(
            target = "application::retention",
            op = "retention::withdraw_job",
            job_id = %job_id,
            error = %err,
            "Failed to remove partial artifacts of a withdrawn job"
        );
    }
}
