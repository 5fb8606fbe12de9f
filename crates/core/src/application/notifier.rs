// Progress / Event Notifier

use crate::application::constants::EVENT_CHANNEL_CAPACITY;
use crate::application::index::JobIndex;
use crate::domain::Job;
use crate::error::Result;
use crate::port::TimeProvider;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Named job events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobEventKind {
    #[serde(rename = "job:created")]
    Created,
    #[serde(rename = "job:started")]
    Started,
    #[serde(rename = "job:progress")]
    Progress,
    #[serde(rename = "job:completed")]
    Completed,
    #[serde(rename = "job:failed")]
    Failed,
    #[serde(rename = "job:cancelled")]
    Cancelled,
    #[serde(rename = "job:deleted")]
    Deleted,
}

impl JobEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEventKind::Created => "job:created",
            JobEventKind::Started => "job:started",
            JobEventKind::Progress => "job:progress",
            JobEventKind::Completed => "job:completed",
            JobEventKind::Failed => "job:failed",
            JobEventKind::Cancelled => "job:cancelled",
            JobEventKind::Deleted => "job:deleted",
        }
    }
}

impl std::fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job at the moment of a transition
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub job: Job,
    pub timestamp: i64,
}

/// Publishes job transitions
///
/// Publishing is durable first: the snapshot is saved through the index
/// before any listener sees the event, and a failed save is returned to the
/// caller instead of being broadcast.
pub struct JobNotifier {
    index: Arc<JobIndex>,
    time_provider: Arc<dyn TimeProvider>,
    tx: broadcast::Sender<JobEvent>,
}

impl JobNotifier {
    pub fn new(index: Arc<JobIndex>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            index,
            time_provider,
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Save `job` and broadcast `kind`
    pub async fn publish(&self, kind: JobEventKind, job: &Job) -> Result<()> {
        if kind != JobEventKind::Deleted {
            self.index.save(job).await?;
        }

        let event = JobEvent {
            kind,
            job: job.clone(),
            timestamp: self.time_provider.now_millis(),
        };

        trace!(
            job_id = %job.id,
            event = %kind,
            progress = job.progress,
            "Publishing job event"
        );

        // No subscribers is not an error
        if self.tx.send(event).is_err() {
            debug!(event = %kind, "No job event subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaperRequest;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::SystemTimeProvider;

    #[tokio::test]
    async fn test_publish_saves_before_broadcast() {
        let store = Arc::new(InMemoryJobStore::new());
        let index = Arc::new(JobIndex::new(store.clone()));
        let notifier = JobNotifier::new(index, Arc::new(SystemTimeProvider));
        let mut rx = notifier.subscribe();

        let job = Job::new("a", 1, PaperRequest::new("A", "english"));
        notifier.publish(JobEventKind::Created, &job).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, JobEventKind::Created);
        assert_eq!(event.job.id, "a");
        assert!(store.snapshot("a").is_some());
    }

    #[tokio::test]
    async fn test_failed_save_is_not_broadcast() {
        let store = Arc::new(InMemoryJobStore::new());
        store.set_fail_saves(true);
        let index = Arc::new(JobIndex::new(store));
        let notifier = JobNotifier::new(index, Arc::new(SystemTimeProvider));
        let mut rx = notifier.subscribe();

        let job = Job::new("a", 1, PaperRequest::new("A", "english"));
        assert!(notifier.publish(JobEventKind::Created, &job).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(JobEventKind::Progress.to_string(), "job:progress");
        assert_eq!(
            serde_json::to_string(&JobEventKind::Cancelled).unwrap(),
            "\"job:cancelled\""
        );
    }
}
