// Webhook Sender Port

use crate::domain::{Job, JobId, JobStatus, PaperResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body POSTed to a job's webhook URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub job_id: JobId,
    pub status: JobStatus,
    /// RFC 3339
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PaperResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookEnvelope {
    pub fn from_job(job: &Job, timestamp_millis: i64) -> Self {
        let timestamp = chrono::DateTime::from_timestamp_millis(timestamp_millis)
            .unwrap_or_default()
            .to_rfc3339();
        Self {
            job_id: job.id.clone(),
            status: job.status,
            timestamp,
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &str, envelope: &WebhookEnvelope) -> Result<(), WebhookError>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingWebhookSender {
        sent: Mutex<Vec<(String, WebhookEnvelope)>>,
        fail: bool,
    }

    impl RecordingWebhookSender {
        pub fn new() -> Self {
            Self::default()
        }

        /// Records the attempt, then reports a 500
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<(String, WebhookEnvelope)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookSender for RecordingWebhookSender {
        async fn post(&self, url: &str, envelope: &WebhookEnvelope) -> Result<(), WebhookError> {
            self.sent
                .lock()
                .unwrap()
                .push((url.to_string(), envelope.clone()));
            if self.fail {
                return Err(WebhookError::Rejected {
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
            Ok(())
        }
    }
}
