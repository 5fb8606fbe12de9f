// Retention Sweeper
// Periodically purges terminal jobs past the retention window

use crate::application::index::JobIndex;
use crate::application::shutdown::ShutdownToken;
use crate::error::Result;
use crate::port::TimeProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Retention policy for finished jobs
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Terminal jobs whose `completed_at` is older than this are deleted
    pub retention: Duration,
    /// How often to sweep
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        use crate::application::constants::{DEFAULT_RETENTION_WINDOW, DEFAULT_SWEEP_INTERVAL};
        Self {
            retention: DEFAULT_RETENTION_WINDOW,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Retention sweeper
///
/// Never touches `pending` or `processing` jobs, whatever their age.
pub struct RetentionSweeper {
    index: Arc<JobIndex>,
    time_provider: Arc<dyn TimeProvider>,
    config: RetentionConfig,
}

impl RetentionSweeper {
    pub fn new(
        index: Arc<JobIndex>,
        time_provider: Arc<dyn TimeProvider>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            index,
            time_provider,
            config,
        }
    }

    /// Sweep loop (background task); the first sweep runs immediately
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention.as_secs(),
            "Retention sweeper started"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Retention sweep failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        info!("Retention sweeper stopped");
    }

    /// Purge now; returns the number of deleted jobs
    pub async fn run_once(&self) -> Result<u64> {
        let retention_ms = i64::try_from(self.config.retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(retention_ms);

        let purged = self.index.purge_older_than(cutoff).await?;
        if purged > 0 {
            info!(purged = purged, cutoff = cutoff, "Expired jobs purged");
        }
        Ok(purged)
    }
}
