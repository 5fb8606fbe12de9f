// Application Layer - Use Cases and Business Logic

pub mod constants;
pub mod index;
pub mod maintenance;
pub mod notifier;
pub mod pipeline;
pub mod queue;
pub mod recovery;
pub mod shutdown;
pub mod webhook;

// Re-exports
pub use index::JobIndex;
pub use maintenance::{RetentionConfig, RetentionSweeper};
pub use notifier::{JobEvent, JobEventKind, JobNotifier};
pub use pipeline::{PipelineConfig, PipelineExecutor, StageError};
pub use queue::JobQueue;
pub use recovery::{RecoveryReport, RecoveryService};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use webhook::WebhookDispatcher;
