// Job Store Port (Interface)

use crate::domain::{Job, JobStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Durable job storage. The store is the source of truth; everything in
/// memory is rebuilt from it at startup.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace the job row with the same id
    async fn save(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn get(&self, id: &str) -> Result<Option<Job>>;

    /// All jobs, newest first
    async fn list(&self) -> Result<Vec<Job>>;

    /// Delete a job, returns false if it did not exist
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete jobs in `statuses` whose `completed_at` is before `cutoff_millis`
    ///
    /// # Returns
    /// Number of jobs deleted
    async fn purge_older_than(&self, cutoff_millis: i64, statuses: &[JobStatus]) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory store with switchable save failures
    #[derive(Default)]
    pub struct InMemoryJobStore {
        rows: Mutex<HashMap<String, Job>>,
        fail_saves: AtomicBool,
        fail_terminal_saves: AtomicUsize,
        save_count: AtomicUsize,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed rows directly, bypassing save accounting
        pub fn with_jobs(jobs: Vec<Job>) -> Self {
            let store = Self::default();
            {
                let mut rows = store.rows.lock().unwrap();
                for job in jobs {
                    rows.insert(job.id.clone(), job);
                }
            }
            store
        }

        pub fn set_fail_saves(&self, fail: bool) {
            self.fail_saves.store(fail, Ordering::SeqCst);
        }

        /// Fail the next `count` saves of completed/failed jobs
        pub fn fail_terminal_saves(&self, count: usize) {
            self.fail_terminal_saves.store(count, Ordering::SeqCst);
        }

        pub fn save_count(&self) -> usize {
            self.save_count.load(Ordering::SeqCst)
        }

        pub fn snapshot(&self, id: &str) -> Option<Job> {
            self.rows.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn save(&self, job: &Job) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AppError::Database("disk I/O error".to_string()));
            }
            if job.status.is_terminal()
                && self
                    .fail_terminal_saves
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(AppError::Database("disk I/O error".to_string()));
            }
            self.save_count.fetch_add(1, Ordering::SeqCst);
            self.rows
                .lock()
                .unwrap()
                .insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<Job>> {
            Ok(self.rows.lock().unwrap().get(id).cloned())
        }

        async fn list(&self) -> Result<Vec<Job>> {
            let mut jobs: Vec<Job> = self.rows.lock().unwrap().values().cloned().collect();
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(jobs)
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            Ok(self.rows.lock().unwrap().remove(id).is_some())
        }

        async fn purge_older_than(
            &self,
            cutoff_millis: i64,
            statuses: &[JobStatus],
        ) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, job| {
                !(statuses.contains(&job.status)
                    && job.completed_at.is_some_and(|at| at < cutoff_millis))
            });
            Ok((before - rows.len()) as u64)
        }
    }
}
