//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CancelResponse, DeleteResponse, JobIdRequest, JobSummary, ListRequest, ListResponse,
    SubmitRequest, SubmitResponse,
};
use crate::validation::validate_submit;
use coursework_core::application::JobQueue;
use coursework_core::domain::{Job, JobStatus, QueueStats};
use coursework_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    queue: Arc<JobQueue>,
    rate_limiter: Arc<RateLimiter>,
}

impl RpcHandler {
    pub fn new(queue: Arc<JobQueue>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            queue,
            rate_limiter,
        }
    }

    /// paper.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        if !self.rate_limiter.check() {
            return Err(throttled());
        }

        let request = validate_submit(params).map_err(to_rpc_error)?;
        let job_id = self.queue.submit(request).await.map_err(to_rpc_error)?;

        // The job may already have been admitted by the time we answer
        let status = self
            .queue
            .get(&job_id)
            .map(|job| job.status)
            .unwrap_or(JobStatus::Pending);

        Ok(SubmitResponse { job_id, status })
    }

    /// paper.get.v1
    pub fn get(&self, params: JobIdRequest) -> Result<Job, ErrorObjectOwned> {
        self.queue
            .get(&params.job_id)
            .ok_or_else(|| not_found(&params.job_id))
    }

    /// paper.list.v1
    pub fn list(&self, params: ListRequest) -> Result<ListResponse, ErrorObjectOwned> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = params.offset.unwrap_or(0);

        let page = self.queue.list(params.status, limit, offset);
        debug!(
            status = ?params.status,
            limit,
            offset,
            total = page.total,
            "Listing jobs"
        );

        Ok(ListResponse {
            jobs: page.jobs.iter().map(JobSummary::from).collect(),
            total: page.total,
            limit,
            offset,
        })
    }

    /// queue.stats.v1
    pub async fn stats(&self) -> Result<QueueStats, ErrorObjectOwned> {
        Ok(self.queue.stats().await)
    }

    /// paper.cancel.v1
    pub async fn cancel(&self, params: JobIdRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        if self.queue.get(&params.job_id).is_none() {
            return Err(not_found(&params.job_id));
        }

        let cancelled = self
            .queue
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: params.job_id,
            cancelled,
        })
    }

    /// paper.delete.v1
    pub async fn delete(&self, params: JobIdRequest) -> Result<DeleteResponse, ErrorObjectOwned> {
        if self.queue.get(&params.job_id).is_none() {
            return Err(not_found(&params.job_id));
        }

        let deleted = self
            .queue
            .delete(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(DeleteResponse {
            job_id: params.job_id,
            deleted,
        })
    }
}

fn not_found(job_id: &str) -> ErrorObjectOwned {
    to_rpc_error(AppError::NotFound(format!("Job {} not found", job_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::code;
    use coursework_core::application::{JobIndex, PipelineConfig, PipelineExecutor};
    use coursework_core::domain::QueueConfig;
    use coursework_core::port::id_provider::mocks::SequentialIdProvider;
    use coursework_core::port::job_store::mocks::InMemoryJobStore;
    use coursework_core::port::paper_agent::mocks::MockPaperAgent;
    use coursework_core::port::renderer::mocks::RecordingRenderer;
    use coursework_core::port::time_provider::mocks::ManualClock;

    fn handler_with(agent: Arc<MockPaperAgent>, burst: u32) -> RpcHandler {
        let index = Arc::new(JobIndex::new(Arc::new(InMemoryJobStore::new())));
        let executor = Arc::new(PipelineExecutor::new(
            agent,
            Arc::new(RecordingRenderer::new()),
            PipelineConfig::default(),
        ));
        let queue = Arc::new(JobQueue::new(
            index,
            executor,
            QueueConfig::new(1),
            Arc::new(SequentialIdProvider::new()),
            Arc::new(ManualClock::new(1_000)),
        ));
        RpcHandler::new(queue, Arc::new(RateLimiter::new(burst, 0)))
    }

    fn submit_request(topic: &str) -> SubmitRequest {
        SubmitRequest {
            topic: topic.to_string(),
            language: "English".to_string(),
            page_count: Some(20),
            metadata: None,
            webhook_url: None,
        }
    }

    #[tokio::test]
    async fn test_submit_then_get() {
        let handler = handler_with(Arc::new(MockPaperAgent::gated()), 10);

        let response = handler.submit(submit_request("Monetary policy")).await.unwrap();
        assert_eq!(response.job_id, "job-1");

        let job = handler
            .get(JobIdRequest {
                job_id: "job-1".to_string(),
            })
            .unwrap();
        assert_eq!(job.input.topic, "Monetary policy");
        assert_eq!(job.input.language, "english");
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_input() {
        let handler = handler_with(Arc::new(MockPaperAgent::gated()), 10);

        let mut request = submit_request("Topic");
        request.page_count = Some(500);
        let err = handler.submit(request).await.unwrap_err();

        assert_eq!(err.code(), code::VALIDATION_ERROR);
        assert_eq!(handler.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_submit_is_rate_limited() {
        let handler = handler_with(Arc::new(MockPaperAgent::gated()), 1);

        tokio_test::assert_ok!(handler.submit(submit_request("First")).await);
        let err = tokio_test::assert_err!(handler.submit(submit_request("Second")).await);

        assert_eq!(err.code(), code::THROTTLED);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let handler = handler_with(Arc::new(MockPaperAgent::gated()), 10);
        let missing = || JobIdRequest {
            job_id: "nope".to_string(),
        };

        assert_eq!(handler.get(missing()).unwrap_err().code(), code::NOT_FOUND);
        assert_eq!(
            handler.cancel(missing()).await.unwrap_err().code(),
            code::NOT_FOUND
        );
        assert_eq!(
            handler.delete(missing()).await.unwrap_err().code(),
            code::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_cancel_pending_and_refuse_delete_of_processing() {
        let handler = handler_with(Arc::new(MockPaperAgent::gated()), 10);
        let first = handler.submit(submit_request("First")).await.unwrap().job_id;
        let second = handler.submit(submit_request("Second")).await.unwrap().job_id;

        let deleted = handler
            .delete(JobIdRequest {
                job_id: first.clone(),
            })
            .await
            .unwrap();
        assert!(!deleted.deleted);

        let cancelled = handler
            .cancel(JobIdRequest {
                job_id: second.clone(),
            })
            .await
            .unwrap();
        assert!(cancelled.cancelled);

        let job = handler.get(JobIdRequest { job_id: second }).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let handler = handler_with(Arc::new(MockPaperAgent::gated()), 10);
        handler.submit(submit_request("First")).await.unwrap();
        handler.submit(submit_request("Second")).await.unwrap();

        let page = handler
            .list(ListRequest {
                status: None,
                limit: Some(1_000),
                offset: None,
            })
            .unwrap();

        assert_eq!(page.limit, MAX_LIST_LIMIT);
        assert_eq!(page.total, 2);
        assert_eq!(page.jobs.len(), 2);
        assert_eq!(page.jobs[0].topic, "Second");
    }
}
