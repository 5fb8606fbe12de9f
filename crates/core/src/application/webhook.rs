// Webhook Dispatcher - terminal job notifications to caller-supplied URLs
use crate::application::notifier::{JobEvent, JobEventKind};
use crate::application::shutdown::ShutdownToken;
use crate::port::{TimeProvider, WebhookEnvelope, WebhookSender};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Posts a summary when a job completes or fails
///
/// Delivery is best effort: one attempt, failures are logged and never touch
/// the job. Cancellations do not notify.
pub struct WebhookDispatcher {
    sender: Arc<dyn WebhookSender>,
    time_provider: Arc<dyn TimeProvider>,
}

impl WebhookDispatcher {
    pub fn new(sender: Arc<dyn WebhookSender>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            sender,
            time_provider,
        }
    }

    /// Consume job events until shutdown (background task)
    pub async fn run(self, mut events: broadcast::Receiver<JobEvent>, mut shutdown: ShutdownToken) {
        info!("Webhook dispatcher started");
        let this = Arc::new(self);

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        let dispatcher = this.clone();
                        tokio::spawn(async move { dispatcher.deliver(&event).await });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Webhook dispatcher lagged behind job events");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.wait() => break,
            }
        }

        info!("Webhook dispatcher stopped");
    }

    /// Deliver one event; returns whether a POST was attempted
    pub async fn deliver(&self, event: &JobEvent) -> bool {
        if !matches!(event.kind, JobEventKind::Completed | JobEventKind::Failed)
            || event.job.is_cancelled()
        {
            return false;
        }
        let url = match event.job.input.webhook_url.as_deref() {
            Some(url) => url,
            None => return false,
        };

        let envelope = WebhookEnvelope::from_job(&event.job, self.time_provider.now_millis());
        match self.sender.post(url, &envelope).await {
            Ok(()) => debug!(job_id = %event.job.id, url = %url, "Webhook delivered"),
            Err(e) => warn!(
                job_id = %event.job.id,
                url = %url,
                error = %e,
                "Webhook delivery failed"
            ),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shutdown::shutdown_channel;
    use crate::domain::{Job, JobStatus, PaperRequest, PaperResult};
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::webhook::mocks::RecordingWebhookSender;
    use std::time::Duration;

    fn event(kind: JobEventKind, job: Job) -> JobEvent {
        JobEvent {
            kind,
            job,
            timestamp: 0,
        }
    }

    fn job_with_hook(url: Option<&str>) -> Job {
        let mut request = PaperRequest::new("X", "english");
        request.webhook_url = url.map(str::to_string);
        Job::new("job-1", 1, request)
    }

    fn dispatcher(sender: Arc<RecordingWebhookSender>) -> WebhookDispatcher {
        WebhookDispatcher::new(sender, Arc::new(ManualClock::new(1_700_000_000_000)))
    }

    #[tokio::test]
    async fn test_completed_job_is_posted() {
        let sender = Arc::new(RecordingWebhookSender::new());
        let mut job = job_with_hook(Some("http://hooks.local/done"));
        job.start(2).unwrap();
        job.complete(PaperResult::sample(), 3).unwrap();

        assert!(dispatcher(sender.clone()).deliver(&event(JobEventKind::Completed, job)).await);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://hooks.local/done");
        assert_eq!(sent[0].1.status, JobStatus::Completed);
        assert!(sent[0].1.result.is_some());
        assert!(sent[0].1.error.is_none());
    }

    #[tokio::test]
    async fn test_non_terminal_and_cancelled_events_are_skipped() {
        let sender = Arc::new(RecordingWebhookSender::new());
        let dispatcher = dispatcher(sender.clone());

        let pending = job_with_hook(Some("http://hooks.local"));
        assert!(!dispatcher.deliver(&event(JobEventKind::Created, pending.clone())).await);

        let mut cancelled = pending;
        cancelled.cancel(5).unwrap();
        assert!(!dispatcher.deliver(&event(JobEventKind::Cancelled, cancelled.clone())).await);
        assert!(!dispatcher.deliver(&event(JobEventKind::Failed, cancelled)).await);

        let mut no_hook = job_with_hook(None);
        no_hook.start(2).unwrap();
        no_hook.fail("boom", 3).unwrap();
        assert!(!dispatcher.deliver(&event(JobEventKind::Failed, no_hook)).await);

        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let sender = Arc::new(RecordingWebhookSender::failing());
        let mut job = job_with_hook(Some("http://hooks.local"));
        job.start(2).unwrap();
        job.fail("Planning structure failed: boom", 3).unwrap();

        assert!(dispatcher(sender.clone()).deliver(&event(JobEventKind::Failed, job)).await);
        assert_eq!(sender.sent().len(), 1);
        assert_eq!(sender.sent()[0].1.error.as_deref(), Some("Planning structure failed: boom"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(4);
        let (stop, token) = shutdown_channel();
        let handle = tokio::spawn(
            dispatcher(Arc::new(RecordingWebhookSender::new())).run(rx, token),
        );

        stop.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        drop(tx);
    }
}
