// Coursework Infrastructure - System Adapters
// Implements: PaperAgent (subprocess), DocumentRenderer (Markdown), WebhookSender (HTTP)

pub mod markdown_renderer;
pub mod subprocess_agent;
pub mod webhook_sender;

pub use markdown_renderer::MarkdownRenderer;
pub use subprocess_agent::{AgentCommandConfig, SubprocessAgent};
pub use webhook_sender::HttpWebhookSender;
