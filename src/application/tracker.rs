//! In-memory job tracker.
//!
//! Single source of truth for job status polled by clients. Reads never
//! block the pipeline's writes; each job has exactly one writer at a time
//! (the pipeline task until a terminal state, the retention manager after).

use dashmap::DashMap;
use metrics::gauge;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::job::{ConversionJob, ErrorKind, JobStatus};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("job {job_id} not found")]
    NotFound { job_id: Uuid },
    #[error("illegal status transition {from:?} -> {to:?} for job {job_id}")]
    IllegalTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: DashMap<Uuid, ConversionJob>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-accepted job.
    pub fn insert(&self, job: ConversionJob) {
        gauge!("papermill_active_jobs").increment(1.0);
        self.jobs.insert(job.id, job);
    }

    /// Snapshot a job for status polling.
    pub fn get(&self, job_id: Uuid) -> Option<ConversionJob> {
        self.jobs.get(&job_id).map(|entry| entry.clone())
    }

    /// Forget a job entirely. Used when intake fails after registration,
    /// so a rejected upload leaves no trace.
    pub fn remove(&self, job_id: Uuid) {
        if self.jobs.remove(&job_id).is_some() {
            gauge!("papermill_active_jobs").decrement(1.0);
        }
    }

    /// Advance a job along the monotonic status chain.
    pub fn transition(
        &self,
        job_id: Uuid,
        next: JobStatus,
    ) -> Result<ConversionJob, TrackerError> {
        self.mutate(job_id, next, |_| {})
    }

    /// Mark a job succeeded and stamp its completion and expiry times.
    pub fn complete(
        &self,
        job_id: Uuid,
        completed_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<ConversionJob, TrackerError> {
        let job = self.mutate(job_id, JobStatus::Succeeded, |job| {
            job.completed_at = Some(completed_at);
            job.expires_at = Some(expires_at);
        })?;
        gauge!("papermill_active_jobs").decrement(1.0);
        Ok(job)
    }

    /// Mark a job failed with the recorded kind.
    pub fn fail(&self, job_id: Uuid, kind: ErrorKind) -> Result<ConversionJob, TrackerError> {
        let job = self.mutate(job_id, JobStatus::Failed, |job| {
            job.error_kind = Some(kind);
            job.completed_at = Some(OffsetDateTime::now_utc());
        })?;
        gauge!("papermill_active_jobs").decrement(1.0);
        Ok(job)
    }

    /// Mark a terminal job expired once its artifacts are gone.
    pub fn expire(&self, job_id: Uuid) -> Result<ConversionJob, TrackerError> {
        self.mutate(job_id, JobStatus::Expired, |_| {})
    }

    /// Succeeded jobs whose retention window has lapsed.
    pub fn lapsed(&self, now: OffsetDateTime) -> Vec<Uuid> {
        self.jobs
            .iter()
            .filter(|entry| {
                entry.status == JobStatus::Succeeded
                    && entry.expires_at.is_some_and(|expires_at| expires_at <= now)
            })
            .map(|entry| entry.id)
            .collect()
    }

    fn mutate(
        &self,
        job_id: Uuid,
        next: JobStatus,
        apply: impl FnOnce(&mut ConversionJob),
    ) -> Result<ConversionJob, TrackerError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(TrackerError::NotFound { job_id })?;

        if !entry.status.can_transition(next) {
            return Err(TrackerError::IllegalTransition {
                job_id,
                from: entry.status,
                to: next,
            });
        }

        entry.status = next;
        apply(&mut entry);
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::formats::DocumentFormat;
    use time::Duration;

    fn job() -> ConversionJob {
        ConversionJob::new(
            DocumentFormat::Docx,
            DocumentFormat::Pdf,
            "input.docx".to_string(),
            2048,
        )
    }

    #[test]
    fn happy_path_walks_the_status_chain() {
        let tracker = JobTracker::new();
        let job = job();
        let id = job.id;
        tracker.insert(job);

        tracker.transition(id, JobStatus::Validating).expect("validating");
        tracker.transition(id, JobStatus::Converting).expect("converting");

        let now = OffsetDateTime::now_utc();
        let done = tracker
            .complete(id, now, now + Duration::minutes(15))
            .expect("succeeded");
        assert_eq!(done.status, JobStatus::Succeeded);
        assert_eq!(done.completed_at, Some(now));

        let expired = tracker.expire(id).expect("expired");
        assert_eq!(expired.status, JobStatus::Expired);
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let tracker = JobTracker::new();
        let job = job();
        let id = job.id;
        tracker.insert(job);

        tracker.transition(id, JobStatus::Validating).expect("validating");
        tracker.transition(id, JobStatus::Converting).expect("converting");

        let err = tracker
            .transition(id, JobStatus::Validating)
            .expect_err("backward transition");
        assert!(matches!(err, TrackerError::IllegalTransition { .. }));
    }

    #[test]
    fn failure_records_the_kind() {
        let tracker = JobTracker::new();
        let job = job();
        let id = job.id;
        tracker.insert(job);

        tracker.transition(id, JobStatus::Validating).expect("validating");
        let failed = tracker
            .fail(id, ErrorKind::ConversionTimeout)
            .expect("failed");
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_kind, Some(ErrorKind::ConversionTimeout));

        // A failed job cannot be resurrected.
        let err = tracker
            .transition(id, JobStatus::Converting)
            .expect_err("terminal");
        assert!(matches!(err, TrackerError::IllegalTransition { .. }));
    }

    #[test]
    fn lapsed_returns_only_succeeded_jobs_past_expiry() {
        let tracker = JobTracker::new();
        let now = OffsetDateTime::now_utc();

        let fresh = job();
        let fresh_id = fresh.id;
        tracker.insert(fresh);
        tracker.transition(fresh_id, JobStatus::Validating).unwrap();
        tracker.transition(fresh_id, JobStatus::Converting).unwrap();
        tracker
            .complete(fresh_id, now, now + Duration::minutes(15))
            .unwrap();

        let stale = job();
        let stale_id = stale.id;
        tracker.insert(stale);
        tracker.transition(stale_id, JobStatus::Validating).unwrap();
        tracker.transition(stale_id, JobStatus::Converting).unwrap();
        tracker
            .complete(stale_id, now - Duration::minutes(30), now - Duration::minutes(15))
            .unwrap();

        let lapsed = tracker.lapsed(now);
        assert_eq!(lapsed, vec![stale_id]);

        let unknown = tracker.get(Uuid::new_v4());
        assert!(unknown.is_none());
    }
}
