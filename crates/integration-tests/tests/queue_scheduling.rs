//! Queue admission and scheduling across the in-memory index and store

mod common;

use common::{build_queue, request, wait_for_status, wait_until};
use coursework_core::application::JobEventKind;
use coursework_core::domain::{JobStatus, CANCELLED_ERROR};
use coursework_core::port::job_store::mocks::InMemoryJobStore;
use coursework_core::port::paper_agent::mocks::MockPaperAgent;
use std::sync::Arc;

#[tokio::test]
async fn test_single_slot_runs_jobs_in_submission_order() {
    let agent = Arc::new(MockPaperAgent::gated());
    let queue = build_queue(Arc::new(InMemoryJobStore::new()), agent.clone(), 1);

    let mut ids = Vec::new();
    for topic in ["Alpha", "Beta", "Gamma"] {
        ids.push(queue.submit(request(topic)).await.unwrap());
    }
    agent.release(3);

    let mut jobs = Vec::new();
    for id in &ids {
        jobs.push(wait_for_status(&queue, id, JobStatus::Completed).await);
    }

    assert_eq!(agent.started_topics(), vec!["Alpha", "Beta", "Gamma"]);
    for pair in jobs.windows(2) {
        let finished = pair[0].completed_at.unwrap();
        let started = pair[1].started_at.unwrap();
        assert!(finished <= started, "{} overlapped {}", pair[1].id, pair[0].id);
    }
}

#[tokio::test]
async fn test_stats_with_one_slot_and_two_submissions() {
    let agent = Arc::new(MockPaperAgent::gated());
    let queue = build_queue(Arc::new(InMemoryJobStore::new()), agent.clone(), 1);

    queue.submit(request("First")).await.unwrap();
    queue.submit(request("Second")).await.unwrap();

    let stats = queue.stats().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.max_concurrent_jobs, 1);
    assert_eq!(stats.in_flight, 1);

    agent.release(2);
    wait_until(|| (queue.index().counts().completed == 2).then_some(()))
        .await
        .expect("both jobs complete");
}

#[tokio::test]
async fn test_processing_never_exceeds_concurrency_limit() {
    let agent = Arc::new(MockPaperAgent::gated());
    let queue = build_queue(Arc::new(InMemoryJobStore::new()), agent.clone(), 2);
    let mut events = queue.subscribe();

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(queue.submit(request(&format!("Topic {}", i))).await.unwrap());
    }
    assert_eq!(queue.stats().await.processing, 2);

    for _ in 0..5 {
        agent.release(1);
        tokio::task::yield_now().await;
        assert!(queue.stats().await.processing <= 2);
    }
    for id in &ids {
        wait_for_status(&queue, id, JobStatus::Completed).await;
    }

    let mut running: i32 = 0;
    let mut peak = 0;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            JobEventKind::Started => running += 1,
            JobEventKind::Completed | JobEventKind::Failed => running -= 1,
            _ => {}
        }
        peak = peak.max(running);
    }
    assert_eq!(running, 0);
    assert_eq!(peak, 2);
}

#[tokio::test]
async fn test_cancel_and_delete_semantics() {
    let agent = Arc::new(MockPaperAgent::gated());
    let store = Arc::new(InMemoryJobStore::new());
    let queue = build_queue(store.clone(), agent.clone(), 1);

    let running = queue.submit(request("Running")).await.unwrap();
    let waiting = queue.submit(request("Waiting")).await.unwrap();

    // Processing jobs can be neither cancelled nor deleted
    assert!(!queue.cancel(&running).await.unwrap());
    assert!(!queue.delete(&running).await.unwrap());

    assert!(queue.cancel(&waiting).await.unwrap());
    let cancelled = queue.get(&waiting).unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.as_deref(), Some(CANCELLED_ERROR));
    assert!(cancelled.completed_at.is_some());
    assert!(!queue.cancel(&waiting).await.unwrap());

    agent.release(1);
    wait_for_status(&queue, &running, JobStatus::Completed).await;
    assert_eq!(agent.started_topics(), vec!["Running"]);

    assert!(queue.delete(&running).await.unwrap());
    assert!(queue.get(&running).is_none());
    assert!(store.snapshot(&running).is_none());
    assert!(!queue.delete(&running).await.unwrap());

    assert!(queue.delete(&waiting).await.unwrap());
    assert_eq!(queue.stats().await.total, 0);
}
