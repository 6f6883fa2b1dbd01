//! The agent loop.
//!
//! Turn 1 goes through the memory-augmented path: inject progressive
//! context into the system message, call the provider, record loaded UUIDs,
//! parse and resolve citations. Later turns call the adapter directly - no
//! re-injection - but citations keep being parsed from every assistant
//! turn.

use std::sync::Arc;

use uuid::Uuid;

use ah_domain::completion::{CompletionRequest, CompletionResult, FinishReason};
use ah_domain::error::{Error, Result};
use ah_domain::message::{Message, ToolCall, ToolExecutionResult};
use ah_domain::scope::build_group_id;
use ah_memory::citations::{parse_citations, resolve_citations};
use ah_memory::injector::{inject_into_messages, ContextInjector, InjectionRequest};
use ah_memory::usage::UsageTracker;
use ah_memory::variants::{assign_variant, get_variant_config};
use ah_providers::registry::ProviderRegistry;
use ah_providers::ProviderAdapter;

use crate::containers::ContainerManager;
use crate::models::{AgentConfig, AgentProgress, AgentResult, AgentStatus};

pub struct AgentRunner {
    providers: Arc<ProviderRegistry>,
    injector: Arc<ContextInjector>,
    usage: Arc<UsageTracker>,
    graph: Arc<dyn ah_graph::GraphStore>,
    containers: Arc<ContainerManager>,
}

impl AgentRunner {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        injector: Arc<ContextInjector>,
        usage: Arc<UsageTracker>,
        graph: Arc<dyn ah_graph::GraphStore>,
        containers: Arc<ContainerManager>,
    ) -> Self {
        Self {
            providers,
            injector,
            usage,
            graph,
            containers,
        }
    }

    /// Run an agent to completion on a task.
    pub async fn run(&self, task: &str, config: AgentConfig) -> AgentResult {
        let agent_id = Uuid::new_v4().to_string();
        let adapter = match self.providers.get(&config.provider) {
            Some(a) => a,
            None => {
                let mut result = AgentResult::new(
                    agent_id,
                    config.provider.clone(),
                    config.model.clone().unwrap_or_default(),
                );
                result.error = Some(format!("unknown provider: {}", config.provider));
                return result;
            }
        };

        let model = config.model.clone().unwrap_or_else(|| "default".into());
        let mut result = AgentResult::new(agent_id, config.provider.clone(), model);

        tracing::info!(
            agent_id = %result.agent_id,
            provider = %config.provider,
            "starting agent"
        );

        if let Err(e) = self.drive(task, &config, adapter, &mut result).await {
            tracing::error!(agent_id = %result.agent_id, error = %e, "agent run failed");
            result.status = AgentStatus::Error;
            result.error = Some(e.to_string());
        }

        tracing::info!(
            agent_id = %result.agent_id,
            status = ?result.status,
            turns = result.turns,
            tokens = result.input_tokens + result.output_tokens,
            cited = result.cited_uuids.len(),
            "agent finished"
        );
        result
    }

    async fn drive(
        &self,
        task: &str,
        config: &AgentConfig,
        adapter: Arc<dyn ProviderAdapter>,
        result: &mut AgentResult,
    ) -> Result<()> {
        let mut messages: Vec<Message> = Vec::new();
        if let Some(ref system) = config.system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(task));

        // Turn 1: memory injection.
        if config.inject_memory {
            let variant = assign_variant(
                config.external_id.as_deref(),
                config.scope_id.as_deref(),
                config.variant_override.as_deref(),
            );
            let variant_config = get_variant_config(variant);
            let (ctx, block) = self
                .injector
                .render(
                    &InjectionRequest {
                        query: task.to_string(),
                        scope: config.scope,
                        scope_id: config.scope_id.clone(),
                        task_type: config.task_type.clone(),
                        session_id: Some(result.session_id.clone()),
                        external_id: Some(result.agent_id.clone()),
                    },
                    &variant_config,
                )
                .await?;

            result.memory_uuids = ctx.loaded_uuids();
            inject_into_messages(&mut messages, &block);
        }

        let group_id = build_group_id(config.scope, config.scope_id.as_deref());
        let mut container_id = config
            .container_id
            .as_deref()
            .and_then(|id| self.containers.get(id))
            .map(|c| c.container_id);

        let mut turn = 0u32;
        while turn < config.max_turns {
            turn += 1;
            result.turns = turn;
            self.progress(result, turn, "running", format!("turn {turn}: sending to {}", config.provider));

            let completion = match adapter
                .complete(CompletionRequest {
                    messages: messages.clone(),
                    model: config.model.clone(),
                    max_tokens: None,
                    temperature: config.temperature,
                    thinking_level: config.thinking_level,
                    tools: config.tools.clone(),
                    response_format: None,
                    enable_programmatic_tools: config.enable_programmatic_tools,
                    container_id: container_id.clone(),
                    working_dir: config.working_dir.clone(),
                })
                .await
            {
                Ok(c) => c,
                Err(e) if e.is_retriable() => {
                    // One retry hint per turn; orchestration above decides more.
                    tracing::warn!(error = %e, "retriable provider error, retrying turn once");
                    adapter
                        .complete(CompletionRequest {
                            messages: messages.clone(),
                            model: config.model.clone(),
                            temperature: config.temperature,
                            thinking_level: config.thinking_level,
                            tools: config.tools.clone(),
                            enable_programmatic_tools: config.enable_programmatic_tools,
                            container_id: container_id.clone(),
                            working_dir: config.working_dir.clone(),
                            ..Default::default()
                        })
                        .await?
                }
                Err(e) => return Err(e),
            };

            self.absorb_usage(result, &completion);
            self.track_container(result, &completion, &mut container_id);
            self.record_citations(result, &completion.content, &group_id).await;

            match completion.finish_reason {
                FinishReason::EndTurn => {
                    result.status = AgentStatus::Success;
                    result.content = completion.content;
                    self.progress(result, turn, "complete", "agent completed task".into());
                    return Ok(());
                }
                FinishReason::ToolUse => {
                    result.tool_calls_count += completion.tool_calls.len();
                    self.progress(
                        result,
                        turn,
                        "tool_use",
                        format!("executing {} tool call(s)", completion.tool_calls.len()),
                    );

                    if config.enable_programmatic_tools && config.tool_handler.is_none() {
                        // Provider-side sandbox already ran the tools; the
                        // results surface in the next call.
                        messages.push(Message::assistant(completion.content));
                        messages.push(Message::user("Continue based on the tool results."));
                    } else {
                        let follow_up = self
                            .execute_external_tools(config, &completion.tool_calls)
                            .await?;
                        messages.push(Message::assistant(completion.content));
                        messages.push(follow_up);
                    }
                }
                FinishReason::MaxTokens => {
                    result.status = AgentStatus::Error;
                    result.error = Some("Response truncated due to max_tokens".into());
                    result.content = completion.content;
                    return Ok(());
                }
                FinishReason::StopSequence => {
                    messages.push(Message::assistant(completion.content));
                    messages.push(Message::user("Please continue."));
                }
            }
        }

        result.status = AgentStatus::MaxTurns;
        result.error = Some(format!("Reached maximum turns ({})", config.max_turns));
        Ok(())
    }

    /// External-tool path: run each call through the handler and render the
    /// results as a synthetic user turn.
    async fn execute_external_tools(
        &self,
        config: &AgentConfig,
        tool_calls: &[ToolCall],
    ) -> Result<Message> {
        let handler = config
            .tool_handler
            .as_ref()
            .ok_or_else(|| Error::Other("tool calls returned but no tool_handler configured".into()))?;

        let mut results: Vec<ToolExecutionResult> = Vec::new();
        for call in tool_calls {
            let result = match handler.execute(call.clone()).await {
                Ok(r) => r,
                Err(e) => ToolExecutionResult {
                    tool_use_id: call.call_id.clone(),
                    content: format!("tool error: {e}"),
                    is_error: true,
                },
            };
            results.push(result);
        }

        let rendered = results
            .iter()
            .map(|r| format!("{}: {}", r.tool_use_id, r.content))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Message::user(format!(
            "Tool execution results:\n{rendered}\n\nContinue based on these results."
        )))
    }

    fn absorb_usage(&self, result: &mut AgentResult, completion: &CompletionResult) {
        result.input_tokens += completion.input_tokens as u64;
        result.output_tokens += completion.output_tokens as u64;
        if let Some(thinking) = completion.thinking_tokens {
            result.thinking_tokens += thinking as u64;
        }
    }

    fn track_container(
        &self,
        result: &mut AgentResult,
        completion: &CompletionResult,
        container_id: &mut Option<String>,
    ) {
        if let Some(ref container) = completion.container {
            *container_id = Some(container.id.clone());
            result.container_id = Some(container.id.clone());
            self.containers
                .register(&container.id, container.expires_at, &result.session_id);
        }
    }

    /// Parse `[M:]`/`[G:]` markers, resolve them within the active scope,
    /// and enqueue `referenced` increments for every resolved UUID.
    async fn record_citations(&self, result: &mut AgentResult, content: &str, group_id: &str) {
        let parsed = parse_citations(content);
        if parsed.unique_prefixes.is_empty() {
            return;
        }

        match resolve_citations(self.graph.as_ref(), &parsed.unique_prefixes, group_id).await {
            Ok(outcome) => {
                for uuid in outcome.resolved.values() {
                    self.usage.increment_referenced(uuid);
                    if !result.cited_uuids.contains(uuid) {
                        result.cited_uuids.push(uuid.clone());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "citation resolution failed, skipping turn citations");
            }
        }
    }

    fn progress(&self, result: &mut AgentResult, turn: u32, status: &str, message: String) {
        result.progress_log.push(AgentProgress {
            turn,
            status: status.into(),
            message,
        });
    }
}
