// Queue and pipeline constants (no magic values)
use std::time::Duration;

/// Default number of jobs allowed in `processing` at once
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// Minimum evaluator score accepted without another attempt
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.80;

/// Attempt cap for the introduction
pub const INTRODUCTION_MAX_ATTEMPTS: u32 = 3;

/// Attempt cap for each chapter section
pub const SECTION_MAX_ATTEMPTS: u32 = 2;

/// Attempt cap for the conclusion
pub const CONCLUSION_MAX_ATTEMPTS: u32 = 3;

/// Score recorded when the evaluator itself fails (counts as a pass)
pub const EVALUATOR_FALLBACK_SCORE: f64 = DEFAULT_QUALITY_THRESHOLD;

/// Page target used when the request does not specify one
pub const DEFAULT_TARGET_PAGES: u32 = 25;

/// Words on one formatted page
pub const WORDS_PER_PAGE: usize = 300;

/// Allowed deviation from the page target (fraction)
pub const PAGE_TOLERANCE: f64 = 0.15;

/// Terminal jobs older than this are purged (24 hours)
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the retention sweeper runs (1 hour)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Buffered job events per subscriber
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// First wait before retrying a failed terminal save; doubles up to the cap
pub const TERMINAL_SAVE_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

pub const TERMINAL_SAVE_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Delay before admission is retried after a job could not be started
pub const ADMISSION_RETRY_DELAY: Duration = Duration::from_millis(250);
