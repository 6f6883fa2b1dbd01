//! Run one agent task with first-turn memory injection.

use ah_domain::scope::MemoryScope;
use ah_runner::{AgentConfig, AgentStatus};

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    task: &str,
    provider: &str,
    model: Option<String>,
    project: Option<String>,
    thinking: Option<String>,
) -> anyhow::Result<()> {
    let thinking_level = thinking
        .as_deref()
        .map(|t| t.parse())
        .transpose()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let (scope, scope_id) = match project {
        Some(p) => (MemoryScope::Project, Some(p)),
        None => (MemoryScope::Global, None),
    };

    let config = AgentConfig {
        provider: provider.to_string(),
        model,
        thinking_level,
        scope,
        scope_id,
        ..Default::default()
    };

    let result = state.runner.run(task, config).await;

    println!("{}", result.content);
    eprintln!(
        "-- agent {} | status {:?} | turns {} | tokens {}+{} | memories {} loaded / {} cited",
        &result.agent_id[..8],
        result.status,
        result.turns,
        result.input_tokens,
        result.output_tokens,
        result.memory_uuids.len(),
        result.cited_uuids.len(),
    );

    match result.status {
        AgentStatus::Success => Ok(()),
        _ => anyhow::bail!(result.error.unwrap_or_else(|| "agent failed".into())),
    }
}
