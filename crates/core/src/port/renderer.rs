// Document Renderer Port

use crate::domain::paper::DocumentRef;
use crate::domain::pipeline::Measured;
use crate::port::AgentError;
use async_trait::async_trait;

/// Turns the finished content tree into a document
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, paper: &Measured) -> Result<DocumentRef, AgentError>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Renderer that records titles and returns a fake path
    #[derive(Default)]
    pub struct RecordingRenderer {
        rendered: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingRenderer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn rendered(&self) -> Vec<String> {
            self.rendered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentRenderer for RecordingRenderer {
        async fn render(&self, paper: &Measured) -> Result<DocumentRef, AgentError> {
            if self.fail {
                return Err(AgentError::Io("renderer out of disk".to_string()));
            }
            let prepared = &paper.evaluated.drafted.prepared;
            self.rendered
                .lock()
                .unwrap()
                .push(prepared.brief.title.clone());
            Ok(DocumentRef {
                path: format!("/papers/{}.md", prepared.job_id),
                format: "markdown".to_string(),
            })
        }
    }
}
