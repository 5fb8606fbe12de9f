// Job Queue - admission, FIFO scheduling and the job execution boundary

use crate::application::constants::{
    ADMISSION_RETRY_DELAY, TERMINAL_SAVE_INITIAL_BACKOFF, TERMINAL_SAVE_MAX_BACKOFF,
};
use crate::application::index::JobIndex;
use crate::application::notifier::{JobEvent, JobEventKind, JobNotifier};
use crate::application::pipeline::progress::ProgressSink;
use crate::application::pipeline::{PipelineExecutor, StageError};
use crate::application::recovery::{RecoveryReport, RecoveryService};
use crate::domain::{Job, JobId, JobPage, JobStatus, PaperRequest, PaperResult, QueueConfig, QueueStats};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Bounded-concurrency job queue
///
/// The in-flight set is the only admission gate. Every admission, cancel,
/// delete and release happens while holding its lock, so no more than
/// `max_concurrent_jobs` jobs are ever `processing`.
pub struct JobQueue {
    index: Arc<JobIndex>,
    notifier: Arc<JobNotifier>,
    executor: Arc<PipelineExecutor>,
    config: QueueConfig,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    in_flight: Mutex<HashSet<JobId>>,
    admission_retry_pending: AtomicBool,
}

impl JobQueue {
    pub fn new(
        index: Arc<JobIndex>,
        executor: Arc<PipelineExecutor>,
        config: QueueConfig,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let notifier = Arc::new(JobNotifier::new(index.clone(), time_provider.clone()));
        Self {
            index,
            notifier,
            executor,
            config,
            id_provider,
            time_provider,
            in_flight: Mutex::new(HashSet::new()),
            admission_retry_pending: AtomicBool::new(false),
        }
    }

    /// Recover interrupted jobs and admit whatever is pending
    pub async fn start(self: &Arc<Self>) -> Result<RecoveryReport> {
        let report = RecoveryService::new(self.index.clone()).recover().await?;
        info!(
            loaded = report.loaded,
            requeued = report.requeued,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Job queue started"
        );
        self.advance().await;
        Ok(report)
    }

    /// Persist a new pending job and try to admit it
    ///
    /// Returns as soon as the job is durable; execution happens in the background.
    ///
    /// # Errors
    /// Store failures are returned and the job is not reported as submitted.
    pub async fn submit(self: &Arc<Self>, request: PaperRequest) -> Result<JobId> {
        let id = self.id_provider.generate_id();
        let job = Job::new(id.clone(), self.time_provider.now_millis(), request);

        self.notifier.publish(JobEventKind::Created, &job).await?;
        info!(
            job_id = %job.id,
            topic = %job.input.topic,
            language = %job.input.language,
            "Job submitted"
        );

        self.advance().await;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.index.get(id)
    }

    pub fn list(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> JobPage {
        self.index.list(status, limit, offset)
    }

    pub async fn stats(&self) -> QueueStats {
        let in_flight = self.in_flight.lock().await.len();
        QueueStats {
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            in_flight,
            ..self.index.counts()
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.notifier.subscribe()
    }

    pub fn index(&self) -> &Arc<JobIndex> {
        &self.index
    }

    /// Cancel a pending job. Processing jobs are never interrupted.
    pub async fn cancel(self: &Arc<Self>, id: &str) -> Result<bool> {
        let cancelled = {
            let _admission = self.in_flight.lock().await;
            match self.index.get(id) {
                Some(mut job) if job.status == JobStatus::Pending => {
                    job.cancel(self.time_provider.now_millis())?;
                    self.notifier.publish(JobEventKind::Cancelled, &job).await?;
                    info!(job_id = %id, "Job cancelled");
                    true
                }
                Some(job) => {
                    debug!(job_id = %id, status = %job.status, "Cancel refused");
                    false
                }
                None => false,
            }
        };

        if cancelled {
            self.advance().await;
        }
        Ok(cancelled)
    }

    /// Delete a job that is not being executed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let in_flight = self.in_flight.lock().await;

        let job = match self.index.get(id) {
            Some(job) => job,
            None => return Ok(false),
        };
        if job.status == JobStatus::Processing || in_flight.contains(id) {
            debug!(job_id = %id, "Delete refused: job is processing");
            return Ok(false);
        }

        let removed = self.index.remove(id).await?;
        if removed {
            self.notifier.publish(JobEventKind::Deleted, &job).await?;
            info!(job_id = %id, status = %job.status, "Job deleted");
        }
        Ok(removed)
    }

    /// Admit pending jobs until no slot or no pending job is left
    pub async fn advance(self: &Arc<Self>) {
        let mut in_flight = self.in_flight.lock().await;

        while in_flight.len() < self.config.max_concurrent_jobs {
            let mut job = match self.index.oldest_pending() {
                Some(job) => job,
                None => break,
            };

            if let Err(e) = job.start(self.time_provider.now_millis()) {
                error!(job_id = %job.id, error = %e, "Cannot start job");
                self.schedule_admission_retry();
                break;
            }
            if let Err(e) = self.notifier.publish(JobEventKind::Started, &job).await {
                // Still pending in the store
                error!(job_id = %job.id, error = %e, "Failed to persist job start");
                self.schedule_admission_retry();
                break;
            }

            info!(
                job_id = %job.id,
                in_flight = in_flight.len() + 1,
                max_concurrent_jobs = self.config.max_concurrent_jobs,
                "Job admitted"
            );
            in_flight.insert(job.id.clone());
            self.spawn_runner(job);
        }
    }

    fn spawn_runner(self: &Arc<Self>, job: Job) {
        tokio::spawn(Arc::clone(self).run_job(job));
    }

    /// One delayed `advance` at a time, so a pending job is not left waiting
    /// for an unrelated submit or finish
    fn schedule_admission_retry(self: &Arc<Self>) {
        if self.admission_retry_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(ADMISSION_RETRY_DELAY).await;
            this.admission_retry_pending.store(false, Ordering::SeqCst);
            debug!("Retrying admission");
            this.advance().await;
        });
    }

    /// Execution boundary: whatever happens inside the pipeline ends as a
    /// terminal job record and a released slot.
    async fn run_job(self: Arc<Self>, job: Job) {
        let job_id = job.id.clone();
        let reporter = JobProgressReporter {
            index: self.index.clone(),
            notifier: self.notifier.clone(),
            job_id: job_id.clone(),
            write: Mutex::new(()),
        };
        let executor = self.executor.clone();
        let request = job.input.clone();
        let run_id = job_id.clone();

        // Separate task so a panic in a stage cannot take the slot with it
        let outcome = tokio::spawn(async move { executor.run(&run_id, &request, &reporter).await })
            .await;

        // The slot is held until the terminal state is durable
        self.finish(job, outcome).await;

        self.in_flight.lock().await.remove(&job_id);
        debug!(job_id = %job_id, "Slot released");

        self.advance().await;
    }

    async fn finish(
        &self,
        started: Job,
        outcome: std::result::Result<std::result::Result<PaperResult, StageError>, JoinError>,
    ) {
        // Latest snapshot carries the progress written by the pipeline
        let mut job = self.index.get(&started.id).unwrap_or(started);
        let now = self.time_provider.now_millis();

        let (kind, transition) = match outcome {
            Ok(Ok(result)) => {
                info!(
                    job_id = %job.id,
                    pages = result.page_report.estimated_pages,
                    quality = result.quality_report.overall_score,
                    "Job completed"
                );
                (JobEventKind::Completed, job.complete(result, now))
            }
            Ok(Err(stage_error)) => {
                warn!(
                    job_id = %job.id,
                    stage = ?stage_error.stage,
                    error = %stage_error,
                    "Job failed"
                );
                (JobEventKind::Failed, job.fail(stage_error.to_string(), now))
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    "pipeline panicked".to_string()
                } else {
                    "pipeline was aborted".to_string()
                };
                error!(job_id = %job.id, error = ?join_error, "Job execution crashed");
                (JobEventKind::Failed, job.fail(message, now))
            }
        };

        if let Err(e) = transition {
            error!(job_id = %job.id, error = %e, "Invalid terminal transition");
            return;
        }
        let mut backoff = TERMINAL_SAVE_INITIAL_BACKOFF;
        while let Err(e) = self.notifier.publish(kind, &job).await {
            error!(
                job_id = %job.id,
                status = %job.status,
                error = %e,
                retry_in_ms = backoff.as_millis() as u64,
                "Failed to persist terminal job state"
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(TERMINAL_SAVE_MAX_BACKOFF);
        }
    }
}

/// Progress sink bound to one running job
///
/// Chapters report concurrently; `write` serializes read, update and save so
/// a slow save can never overwrite a newer snapshot with an older one.
struct JobProgressReporter {
    index: Arc<JobIndex>,
    notifier: Arc<JobNotifier>,
    job_id: JobId,
    write: Mutex<()>,
}

#[async_trait]
impl ProgressSink for JobProgressReporter {
    async fn report(&self, progress: u8, step: &str) -> Result<()> {
        let _write = self.write.lock().await;
        let mut job = self
            .index
            .get(&self.job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {}", self.job_id)))?;
        job.record_progress(progress, step)?;
        self.notifier.publish(JobEventKind::Progress, &job).await
    }
}
