// Queue Domain Model

use serde::{Deserialize, Serialize};

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent_jobs: usize,
}

impl QueueConfig {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(crate::application::constants::DEFAULT_MAX_CONCURRENT_JOBS)
    }
}

/// Derived queue statistics (never stored)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub max_concurrent_jobs: usize,
    pub in_flight: usize,
}

/// Page of jobs returned by list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<crate::domain::Job>,
    pub total: usize,
}
