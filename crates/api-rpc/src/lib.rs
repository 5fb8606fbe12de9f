//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server in front of the job queue: submission (validated and
//! rate limited), status, listing, stats, cancel and delete.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;
pub mod validation;

pub use handler::RpcHandler;
pub use rate_limiter::RateLimiter;
pub use server::{RpcServer, RpcServerConfig};
