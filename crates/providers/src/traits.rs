use std::sync::Arc;

use async_trait::async_trait;

use ah_domain::completion::{CompletionRequest, CompletionResult};
use ah_domain::error::Result;
use ah_domain::message::{Message, ToolCall, ToolDefinition, ToolExecutionResult};
use ah_domain::stream::{BoxStream, StreamEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Executes tool calls on behalf of a provider that has no sandbox of its
/// own (Gemini). The caller supplies the implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, call: ToolCall) -> Result<ToolExecutionResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-loop request / events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request for an adapter-driven tool-calling session.
#[derive(Clone)]
pub struct ToolLoopRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub tools: Vec<ToolDefinition>,
    /// Gate for all write tools. `false` denies them outright.
    pub write_enabled: bool,
    /// Skip the permission callback for write tools.
    pub yolo_mode: bool,
    pub working_dir: Option<String>,
    /// Local executor for providers without a sandbox.
    pub tool_handler: Option<Arc<dyn ToolHandler>>,
    /// Permission hook consulted for write tools when not in yolo mode.
    pub permission_hook: Option<Arc<dyn crate::permissions::PermissionHook>>,
}

impl std::fmt::Debug for ToolLoopRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolLoopRequest")
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.len())
            .field("write_enabled", &self.write_enabled)
            .field("yolo_mode", &self.yolo_mode)
            .finish()
    }
}

/// One provider message from a tool-calling session, paired with the
/// provider-side session id.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub message: Message,
    pub session_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core adapter trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every provider adapter implements.
///
/// Adapters are reused per provider within a runner and must be safe for
/// concurrent `complete` calls - each call builds its own request state.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter name ("claude", "gemini").
    fn name(&self) -> &str;

    /// "oauth" or "api_key".
    fn auth_mode(&self) -> &str;

    /// Send a completion request and wait for the full response.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResult>;

    /// Send a completion request and return a stream of events.
    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Drive a multi-turn tool-calling session, yielding provider messages
    /// as they complete.
    async fn complete_with_tools(
        &self,
        req: ToolLoopRequest,
    ) -> Result<BoxStream<'static, Result<AgentMessage>>>;

    /// Cheap liveness probe (CLI present / API reachable).
    async fn health_check(&self) -> Result<()>;
}
