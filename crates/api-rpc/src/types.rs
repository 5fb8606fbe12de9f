//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use coursework_core::domain::{Job, JobStatus, PaperMetadata};
use serde::{Deserialize, Serialize};

/// paper.submit.v1 - Submit a paper generation job
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub topic: String,
    pub language: String,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub metadata: Option<PaperMetadata>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// paper.get.v1 / paper.cancel.v1 / paper.delete.v1
#[derive(Debug, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// paper.list.v1 - List jobs, newest first
#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Job without its (large) result
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub topic: String,
    pub language: String,
    pub progress: u8,
    pub current_step: Option<String>,
    pub error: Option<String>,
    pub document_path: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            topic: job.input.topic.clone(),
            language: job.input.language.clone(),
            progress: job.progress,
            current_step: job.current_step.clone(),
            error: job.error.clone(),
            document_path: job.result.as_ref().map(|r| r.document.path.clone()),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub job_id: String,
    pub deleted: bool,
}
