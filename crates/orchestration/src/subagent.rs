//! Subagent spawning and lifecycle.
//!
//! A subagent is one isolated adapter call: its own message list, its own
//! timeout, no shared conversation with the parent. Failures and timeouts
//! are captured as terminal status on the result, never raised - a parent
//! orchestrating ten children wants nine answers and one "timeout", not a
//! panic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use ah_domain::completion::CompletionRequest;
use ah_domain::message::{Message, ToolDefinition};
use ah_domain::thinking::ThinkingLevel;
use ah_providers::registry::ProviderRegistry;

/// Default per-subagent timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config / result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct SubagentConfig {
    /// Human-readable name.
    pub name: String,
    /// Provider id ("claude", "gemini").
    pub provider: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub thinking_level: Option<ThinkingLevel>,
    pub tools: Vec<ToolDefinition>,
    pub timeout_secs: u64,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            name: "subagent".into(),
            provider: "claude".into(),
            model: None,
            system_prompt: None,
            max_tokens: 4096,
            temperature: None,
            thinking_level: None,
            tools: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Completed,
    Error,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubagentResult {
    pub subagent_id: String,
    pub name: String,
    pub content: String,
    pub status: SubagentStatus,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_content: Option<String>,
    pub thinking_tokens: Option<u64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub trace_id: Option<String>,
}

impl SubagentResult {
    fn failed(
        subagent_id: String,
        config: &SubagentConfig,
        status: SubagentStatus,
        error: String,
        started_at: DateTime<Utc>,
        parent_id: Option<String>,
        trace_id: Option<String>,
    ) -> Self {
        Self {
            subagent_id,
            name: config.name.clone(),
            content: String::new(),
            status,
            provider: config.provider.clone(),
            model: config.model.clone().unwrap_or_default(),
            input_tokens: 0,
            output_tokens: 0,
            thinking_content: None,
            thinking_tokens: None,
            error: Some(error),
            started_at,
            completed_at: Some(Utc::now()),
            parent_id,
            trace_id,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SubagentManager {
    providers: Arc<ProviderRegistry>,
    active: Mutex<HashMap<String, JoinHandle<SubagentResult>>>,
}

impl SubagentManager {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a subagent and wait for it.
    ///
    /// The context window is isolated: optional system prompt, optional
    /// parent-provided context messages, then the task as the user turn.
    pub async fn spawn(
        &self,
        task: &str,
        config: &SubagentConfig,
        context: Option<Vec<Message>>,
        parent_id: Option<String>,
        trace_id: Option<String>,
    ) -> SubagentResult {
        let subagent_id = Uuid::new_v4().to_string()[..8].to_string();
        let started_at = Utc::now();

        tracing::info!(
            name = %config.name,
            subagent_id = %subagent_id,
            provider = %config.provider,
            parent = parent_id.as_deref().unwrap_or("-"),
            "spawning subagent"
        );

        let Some(adapter) = self.providers.get(&config.provider) else {
            return SubagentResult::failed(
                subagent_id,
                config,
                SubagentStatus::Error,
                format!("unknown provider: {}", config.provider),
                started_at,
                parent_id,
                trace_id,
            );
        };

        let mut messages: Vec<Message> = Vec::new();
        if let Some(ref system) = config.system_prompt {
            messages.push(Message::system(system));
        }
        if let Some(context) = context {
            messages.extend(context);
        }
        messages.push(Message::user(task));

        let request = CompletionRequest {
            messages,
            model: config.model.clone(),
            max_tokens: Some(config.max_tokens),
            temperature: config.temperature,
            thinking_level: config.thinking_level,
            tools: config.tools.clone(),
            ..Default::default()
        };

        let call = adapter.complete(request);
        match tokio::time::timeout(Duration::from_secs(config.timeout_secs), call).await {
            Ok(Ok(completion)) => SubagentResult {
                subagent_id,
                name: config.name.clone(),
                content: completion.content,
                status: SubagentStatus::Completed,
                provider: completion.provider,
                model: completion.model,
                input_tokens: completion.input_tokens as u64,
                output_tokens: completion.output_tokens as u64,
                thinking_content: completion.thinking_content,
                thinking_tokens: completion.thinking_tokens.map(u64::from),
                error: None,
                started_at,
                completed_at: Some(Utc::now()),
                parent_id,
                trace_id,
            },
            Ok(Err(e)) => {
                tracing::warn!(name = %config.name, error = %e, "subagent errored");
                SubagentResult::failed(
                    subagent_id,
                    config,
                    SubagentStatus::Error,
                    e.to_string(),
                    started_at,
                    parent_id,
                    trace_id,
                )
            }
            Err(_) => {
                tracing::warn!(
                    name = %config.name,
                    timeout_secs = config.timeout_secs,
                    "subagent timed out"
                );
                SubagentResult::failed(
                    subagent_id,
                    config,
                    SubagentStatus::Timeout,
                    format!("execution timed out after {} seconds", config.timeout_secs),
                    started_at,
                    parent_id,
                    trace_id,
                )
            }
        }
    }

    /// Spawn in the background; returns the id for later retrieval.
    pub fn spawn_background(
        self: &Arc<Self>,
        task: String,
        config: SubagentConfig,
        context: Option<Vec<Message>>,
        parent_id: Option<String>,
        trace_id: Option<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string()[..8].to_string();
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            manager
                .spawn(&task, &config, context, parent_id, trace_id)
                .await
        });
        self.active.lock().insert(id.clone(), handle);
        tracing::info!(subagent_id = %id, "spawned background subagent");
        id
    }

    /// Wait for a background subagent. `None` when the id is unknown or the
    /// wait timed out (the subagent keeps running).
    pub async fn get_result(
        &self,
        subagent_id: &str,
        timeout: Option<Duration>,
    ) -> Option<SubagentResult> {
        let handle = self.active.lock().remove(subagent_id)?;

        match timeout {
            Some(t) => match tokio::time::timeout(t, handle).await {
                // Wait expired: the subagent keeps running detached; the
                // caller sees not-ready.
                Err(_) => None,
                Ok(joined) => joined.ok(),
            },
            None => handle.await.ok(),
        }
    }

    /// Cancel a background subagent. Returns whether one was found.
    pub fn cancel(&self, subagent_id: &str) -> bool {
        match self.active.lock().remove(subagent_id) {
            Some(handle) => {
                handle.abort();
                tracing::info!(subagent_id, "cancelled subagent");
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn providers(&self) -> Arc<ProviderRegistry> {
        self.providers.clone()
    }
}
