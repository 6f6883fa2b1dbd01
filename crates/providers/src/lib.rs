//! `ah-providers` - LLM provider adapters.
//!
//! A single [`ProviderAdapter`] trait fronts heterogeneous providers:
//! Claude through the locally installed OAuth CLI, Gemini through its REST
//! API. Feature differences (thinking budgets, containers, structured
//! output, sandboxed tools) are optional fields on the request/result
//! structs - an unsupported field is a no-op, never an error.

pub mod claude;
pub mod gemini;
pub mod permissions;
pub mod registry;
pub mod retry;
pub mod sse;
pub mod structured;
pub mod traits;
pub mod util;

pub use claude::ClaudeCliAdapter;
pub use gemini::GeminiAdapter;
pub use permissions::{evaluate_tool_permission, PermissionDecision, PermissionHook};
pub use registry::ProviderRegistry;
pub use traits::{AgentMessage, ProviderAdapter, ToolHandler, ToolLoopRequest};
