// In-Memory Job Index - write-through cache in front of the JobStore

use crate::domain::{Job, JobPage, JobStatus, QueueStats};
use crate::error::Result;
use crate::port::JobStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Fast read path for jobs. The store stays authoritative: every mutation is
/// written to the store first and only then applied here.
pub struct JobIndex {
    store: Arc<dyn JobStore>,
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobIndex {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Replace the index contents with `jobs` (used at startup)
    pub fn replace_all(&self, jobs: Vec<Job>) {
        let mut map = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        map.clear();
        for job in jobs {
            map.insert(job.id.clone(), job);
        }
        debug!(jobs = map.len(), "Job index rebuilt");
    }

    /// Persist then cache. A failed store write leaves the index untouched.
    pub async fn save(&self, job: &Job) -> Result<()> {
        self.store.save(job).await?;
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    /// Delete from store then cache
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let existed_in_store = self.store.delete(id).await?;
        let existed_in_index = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        Ok(existed_in_store || existed_in_index)
    }

    /// Purge terminal jobs completed before `cutoff_millis` from store and cache
    pub async fn purge_older_than(&self, cutoff_millis: i64) -> Result<u64> {
        let statuses = [JobStatus::Completed, JobStatus::Failed];
        let purged = self.store.purge_older_than(cutoff_millis, &statuses).await?;
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, job| {
                !(job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff_millis))
            });
        Ok(purged)
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Oldest pending job (FIFO by creation time, id as tie-breaker)
    pub fn oldest_pending(&self) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned()
    }

    /// Newest first, optionally filtered by status
    pub fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        let map = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut jobs: Vec<&Job> = map
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = jobs.len();
        let jobs = jobs.into_iter().skip(offset).take(limit).cloned().collect();
        JobPage { jobs, total }
    }

    /// Counts by status (`max_concurrent_jobs` and `in_flight` are filled by the queue)
    pub fn counts(&self) -> QueueStats {
        let map = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut stats = QueueStats {
            total: map.len(),
            ..QueueStats::default()
        };
        for job in map.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
