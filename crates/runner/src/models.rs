use std::sync::Arc;

use serde::Serialize;

use ah_domain::message::ToolDefinition;
use ah_domain::scope::MemoryScope;
use ah_domain::thinking::ThinkingLevel;
use ah_providers::ToolHandler;

/// Safety cap on agentic turns.
pub const MAX_AGENT_TURNS: u32 = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for one agent run.
#[derive(Clone)]
pub struct AgentConfig {
    /// Provider id ("claude", "gemini").
    pub provider: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_turns: u32,
    pub thinking_level: Option<ThinkingLevel>,
    /// Provider-side tool sandbox (Claude).
    pub enable_programmatic_tools: bool,
    /// Reuse an existing container.
    pub container_id: Option<String>,
    pub working_dir: Option<String>,
    /// External tools + handler (Gemini path).
    pub tools: Vec<ToolDefinition>,
    pub tool_handler: Option<Arc<dyn ToolHandler>>,
    /// Memory injection on turn 1.
    pub inject_memory: bool,
    pub scope: MemoryScope,
    pub scope_id: Option<String>,
    pub task_type: Option<String>,
    /// Stable caller identity for deterministic variant assignment
    /// (e.g. a task id). Same (external_id, scope_id) → same variant.
    pub external_id: Option<String>,
    /// Force a specific scoring variant, bypassing hash assignment.
    pub variant_override: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "claude".into(),
            model: None,
            system_prompt: None,
            temperature: None,
            max_turns: MAX_AGENT_TURNS,
            thinking_level: None,
            enable_programmatic_tools: true,
            container_id: None,
            working_dir: None,
            tools: Vec::new(),
            tool_handler: None,
            inject_memory: true,
            scope: MemoryScope::Global,
            scope_id: None,
            task_type: None,
            external_id: None,
            variant_override: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Progress / result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One progress update during a run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProgress {
    pub turn: u32,
    /// "running" | "tool_use" | "complete" | "error".
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Error,
    MaxTurns,
}

/// Final result of an agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub session_id: String,
    pub status: AgentStatus,
    pub content: String,
    pub provider: String,
    pub model: String,
    pub turns: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_tokens: u64,
    pub tool_calls_count: usize,
    pub container_id: Option<String>,
    /// UUIDs injected on turn 1.
    pub memory_uuids: Vec<String>,
    /// UUIDs the model actually cited, resolved within the active scope.
    pub cited_uuids: Vec<String>,
    pub error: Option<String>,
    pub progress_log: Vec<AgentProgress>,
}

impl AgentResult {
    pub fn new(agent_id: String, provider: String, model: String) -> Self {
        Self {
            session_id: agent_id.clone(),
            agent_id,
            status: AgentStatus::Error,
            content: String::new(),
            provider,
            model,
            turns: 0,
            input_tokens: 0,
            output_tokens: 0,
            thinking_tokens: 0,
            tool_calls_count: 0,
            container_id: None,
            memory_uuids: Vec::new(),
            cited_uuids: Vec::new(),
            error: None,
            progress_log: Vec::new(),
        }
    }
}
