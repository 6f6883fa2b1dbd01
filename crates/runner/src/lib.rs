//! `ah-runner` - the agentic turn loop.
//!
//! Drives a provider through multiple tool-calling turns until it finishes,
//! errors, or hits the turn cap. Memory is injected once, on turn 1;
//! citations are parsed from every assistant turn and fed back into the
//! usage tracker.

pub mod cancel;
pub mod containers;
pub mod models;
pub mod runner;

pub use cancel::{cancellable_stream, StreamCancelRegistry, StreamCancelToken};
pub use containers::ContainerManager;
pub use models::{AgentConfig, AgentProgress, AgentResult, AgentStatus};
pub use runner::AgentRunner;
