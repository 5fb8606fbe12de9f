// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod paper;
pub mod pipeline;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobStatus, PaperMetadata, PaperRequest, CANCELLED_ERROR};
pub use paper::{
    Chapter, ChapterKind, DocumentRef, Evaluation, PageReport, PaperResult, QualityReport,
    Section, WrittenText,
};
pub use pipeline::{PaperDocument, PipelineStage};
pub use queue::{JobPage, QueueConfig, QueueStats};
