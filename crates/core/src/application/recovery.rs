// Crash recovery logic
use crate::application::index::JobIndex;
use crate::domain::JobStatus;
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Crash recovery service
///
/// On startup, rebuilds the in-memory index from the store and requeues jobs
/// that were `processing` when the previous process died. No execution can
/// survive a restart, so those jobs would otherwise stay stuck forever.
pub struct RecoveryService {
    index: Arc<JobIndex>,
}

/// Outcome of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub loaded: usize,
    pub requeued: usize,
}

impl RecoveryService {
    pub fn new(index: Arc<JobIndex>) -> Self {
        Self { index }
    }

    /// Load every job from the store and requeue interrupted ones
    ///
    /// Algorithm:
    /// 1. Read all rows from the store into the index
    /// 2. For each `processing` job: reset to `pending` and persist the reset
    ///
    /// A store failure aborts recovery; starting with a half-recovered index
    /// would hide jobs from the scheduler.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let jobs = self.index.store().list().await?;
        let loaded = jobs.len();

        let interrupted: Vec<_> = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Processing)
            .cloned()
            .collect();

        self.index.replace_all(jobs);

        let mut requeued = 0;
        for mut job in interrupted {
            warn!(
                job_id = %job.id,
                started_at = ?job.started_at,
                progress = job.progress,
                step = ?job.current_step,
                "Requeuing job interrupted by restart"
            );
            job.requeue()?;
            self.index.save(&job).await?;
            requeued += 1;
        }

        info!(loaded = loaded, requeued = requeued, "Job recovery complete");
        Ok(RecoveryReport { loaded, requeued })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, PaperRequest};
    use crate::port::job_store::mocks::InMemoryJobStore;

    #[tokio::test]
    async fn test_processing_jobs_are_requeued() {
        let mut running = Job::new("running", 1, PaperRequest::new("A", "english"));
        running.start(2).unwrap();
        running.record_progress(60, "Writing chapters").unwrap();
        let pending = Job::new("pending", 3, PaperRequest::new("B", "english"));

        let store = Arc::new(InMemoryJobStore::with_jobs(vec![running, pending]));
        let index = Arc::new(JobIndex::new(store.clone()));

        let report = RecoveryService::new(index.clone()).recover().await.unwrap();

        assert_eq!(report, RecoveryReport { loaded: 2, requeued: 1 });
        let recovered = index.get("running").unwrap();
        assert_eq!(recovered.status, JobStatus::Pending);
        assert_eq!(recovered.progress, 0);
        assert_eq!(recovered.started_at, None);
        // reset is durable, not only in memory
        assert_eq!(store.snapshot("running").unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_recovery_fails_when_reset_cannot_be_saved() {
        let mut running = Job::new("running", 1, PaperRequest::new("A", "english"));
        running.start(2).unwrap();
        let store = Arc::new(InMemoryJobStore::with_jobs(vec![running]));
        store.set_fail_saves(true);
        let index = Arc::new(JobIndex::new(store));

        tokio_test::assert_err!(RecoveryService::new(index).recover().await);
    }
}
