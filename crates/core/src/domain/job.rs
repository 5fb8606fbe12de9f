// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::paper::PaperResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Error marker stored on jobs cancelled while still pending
pub const CANCELLED_ERROR: &str = "cancelled: job was cancelled before it started";

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Terminal states carry either a result or an error
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Optional title-page metadata supplied with a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

/// Immutable request payload of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRequest {
    pub topic: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub metadata: PaperMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl PaperRequest {
    pub fn new(topic: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            language: language.into(),
            page_count: None,
            metadata: PaperMetadata::default(),
            webhook_url: None,
        }
    }
}

/// Job Entity
///
/// Status changes only go through the transition methods below, which keep the
/// result/error and timestamp invariants intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub input: PaperRequest,
    pub progress: u8,
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PaperResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Job {
    /// Create a pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `input` - Request payload
    pub fn new(id: impl Into<String>, created_at: i64, input: PaperRequest) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            input,
            progress: 0,
            current_step: None,
            result: None,
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    fn transition_error(&self, to: JobStatus) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// pending -> processing
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(now_millis);
        self.current_step = None;
        Ok(())
    }

    /// Record stage progress. Progress never moves backwards.
    pub fn record_progress(&mut self, progress: u8, step: impl Into<String>) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Processing));
        }
        self.progress = self.progress.max(progress.min(100));
        self.current_step = Some(step.into());
        Ok(())
    }

    /// processing -> completed
    pub fn complete(&mut self, result: PaperResult, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// processing -> failed
    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.mark_failed(error.into(), now_millis);
        Ok(())
    }

    /// pending -> failed with the cancellation marker
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.mark_failed(CANCELLED_ERROR.to_string(), now_millis);
        Ok(())
    }

    fn mark_failed(&mut self, error: String, now_millis: i64) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(error);
        self.completed_at = Some(now_millis);
    }

    /// processing -> pending, used only when a previous process died mid-run
    pub fn requeue(&mut self) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Pending));
        }
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.progress = 0;
        self.current_step = None;
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Failed && self.error.as_deref() == Some(CANCELLED_ERROR)
    }
}
