// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod paper_agent;
pub mod renderer;
pub mod time_provider;
pub mod webhook;

// Re-exports
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use paper_agent::{
    AgentError, AgentStage, BibliographyRequest, EvaluationRequest, EvaluationVerdict,
    PaperAgent, ResearchRequest, WritingRequest, WritingUnit,
};
pub use renderer::DocumentRenderer;
pub use time_provider::TimeProvider;
pub use webhook::{WebhookEnvelope, WebhookError, WebhookSender};
