use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Concurrent subagents in the parallel executor.
    #[serde(default = "d_concurrency")]
    pub max_concurrency: usize,
    /// Per-subagent timeout.
    #[serde(default = "d_subagent_timeout")]
    pub subagent_timeout_secs: u64,
    /// Maker-checker revision rounds.
    #[serde(default = "d_iterations")]
    pub max_verification_iterations: u32,
    /// Agent runner turn cap.
    #[serde(default = "d_max_turns")]
    pub max_agent_turns: u32,
    /// Roundtable deliberation rounds.
    #[serde(default = "d_rounds")]
    pub max_deliberation_rounds: u32,
    /// Conversation window shown to roundtable speakers.
    #[serde(default = "d_window")]
    pub roundtable_context_messages: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: d_concurrency(),
            subagent_timeout_secs: d_subagent_timeout(),
            max_verification_iterations: d_iterations(),
            max_agent_turns: d_max_turns(),
            max_deliberation_rounds: d_rounds(),
            roundtable_context_messages: d_window(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_concurrency() -> usize {
    5
}
fn d_subagent_timeout() -> u64 {
    300
}
fn d_iterations() -> u32 {
    3
}
fn d_max_turns() -> u32 {
    20
}
fn d_rounds() -> u32 {
    3
}
fn d_window() -> usize {
    20
}
