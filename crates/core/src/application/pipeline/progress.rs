// Progress reporting seam between the pipeline and the queue

use crate::error::Result;
use async_trait::async_trait;

/// Receives progress from the pipeline executor that owns a job
///
/// Every report is expected to be durable by the time it returns; an error
/// means the job's state could not be saved and the job must not continue.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: u8, step: &str) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Collects reports in order
    #[derive(Default)]
    pub struct RecordingSink {
        reports: Mutex<Vec<(u8, String)>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<(u8, String)> {
            self.reports.lock().unwrap().clone()
        }

        pub fn steps(&self) -> Vec<String> {
            self.reports().into_iter().map(|(_, step)| step).collect()
        }
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, progress: u8, step: &str) -> Result<()> {
            self.reports
                .lock()
                .unwrap()
                .push((progress, step.to_string()));
            Ok(())
        }
    }
}
