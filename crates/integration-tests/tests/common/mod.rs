//! Shared fixtures for the integration tests

#![allow(dead_code)]

use coursework_core::application::{JobIndex, JobQueue, PipelineConfig, PipelineExecutor};
use coursework_core::domain::{Job, JobStatus, PaperRequest, QueueConfig};
use coursework_core::port::id_provider::mocks::SequentialIdProvider;
use coursework_core::port::paper_agent::mocks::MockPaperAgent;
use coursework_core::port::renderer::mocks::RecordingRenderer;
use coursework_core::port::time_provider::mocks::ManualClock;
use coursework_core::port::{JobStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;

pub fn build_queue(
    store: Arc<dyn JobStore>,
    agent: Arc<MockPaperAgent>,
    max_concurrent_jobs: usize,
) -> Arc<JobQueue> {
    build_queue_with_clock(
        store,
        agent,
        max_concurrent_jobs,
        Arc::new(ManualClock::new(1_000)),
    )
}

pub fn build_queue_with_clock(
    store: Arc<dyn JobStore>,
    agent: Arc<MockPaperAgent>,
    max_concurrent_jobs: usize,
    clock: Arc<dyn TimeProvider>,
) -> Arc<JobQueue> {
    let index = Arc::new(JobIndex::new(store));
    let executor = Arc::new(PipelineExecutor::new(
        agent,
        Arc::new(RecordingRenderer::new()),
        PipelineConfig::default(),
    ));
    Arc::new(JobQueue::new(
        index,
        executor,
        QueueConfig::new(max_concurrent_jobs),
        Arc::new(SequentialIdProvider::new()),
        clock,
    ))
}

pub fn request(topic: &str) -> PaperRequest {
    PaperRequest::new(topic, "english")
}

pub async fn wait_for_status(queue: &JobQueue, id: &str, status: JobStatus) -> Job {
    wait_until(|| queue.get(id).filter(|job| job.status == status))
        .await
        .unwrap_or_else(|| panic!("job {} never reached {}", id, status))
}

/// Poll `probe` for up to five seconds
pub async fn wait_until<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    for _ in 0..1000 {
        if let Some(value) = probe() {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
}
