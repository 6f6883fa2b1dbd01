//! Agent-loop integration tests over scripted adapters and the in-memory
//! graph.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use ah_domain::completion::{CompletionRequest, CompletionResult, FinishReason};
use ah_domain::error::{Error, Result};
use ah_domain::message::ToolCall;
use ah_domain::stream::{BoxStream, StreamEvent};
use ah_graph::testing::InMemoryGraph;
use ah_graph::{EpisodeNode, GraphStore};
use ah_memory::injector::ContextInjector;
use ah_memory::service::MemoryServices;
use ah_memory::state::SessionRegistry;
use ah_memory::usage::UsageTracker;
use ah_providers::registry::ProviderRegistry;
use ah_providers::{AgentMessage, ProviderAdapter, ToolLoopRequest};
use ah_runner::{AgentConfig, AgentRunner, AgentStatus, ContainerManager};

// ── Scripted adapter ───────────────────────────────────────────────

struct Scripted {
    name: String,
    turns: Mutex<Vec<CompletionResult>>,
}

impl Scripted {
    fn new(name: &str, mut turns: Vec<CompletionResult>) -> Self {
        turns.reverse();
        Self {
            name: name.into(),
            turns: Mutex::new(turns),
        }
    }
}

fn turn(content: &str, finish: FinishReason) -> CompletionResult {
    CompletionResult {
        content: content.into(),
        model: "scripted".into(),
        provider: "scripted".into(),
        input_tokens: 100,
        output_tokens: 50,
        finish_reason: finish,
        thinking_content: None,
        thinking_tokens: None,
        tool_calls: Vec::new(),
        container: None,
        cache_metrics: None,
    }
}

#[async_trait]
impl ProviderAdapter for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn auth_mode(&self) -> &str {
        "none"
    }

    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResult> {
        self.turns
            .lock()
            .pop()
            .ok_or_else(|| Error::Other("script exhausted".into()))
    }

    async fn stream(
        &self,
        _req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        Err(Error::Other("not scripted".into()))
    }

    async fn complete_with_tools(
        &self,
        _req: ToolLoopRequest,
    ) -> Result<BoxStream<'static, Result<AgentMessage>>> {
        Err(Error::Other("not scripted".into()))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    graph: Arc<InMemoryGraph>,
    usage: Arc<UsageTracker>,
    runner: AgentRunner,
}

fn harness(adapter: Scripted) -> Harness {
    let graph = Arc::new(InMemoryGraph::new());
    let usage = Arc::new(UsageTracker::new(graph.clone(), None, 30));
    let services = Arc::new(MemoryServices::new(graph.clone()));
    let sessions = Arc::new(SessionRegistry::new(None, 24));
    let injector = Arc::new(ContextInjector::new(
        services,
        usage.clone(),
        sessions,
        None,
        3000,
        10,
        8,
    ));
    let registry = Arc::new(ProviderRegistry::from_adapters(
        vec![Arc::new(adapter)],
        "scripted",
    ));
    let runner = AgentRunner::new(
        registry,
        injector,
        usage.clone(),
        graph.clone() as Arc<dyn GraphStore>,
        Arc::new(ContainerManager::new()),
    );
    Harness {
        graph,
        usage,
        runner,
    }
}

fn config() -> AgentConfig {
    AgentConfig {
        provider: "scripted".into(),
        ..Default::default()
    }
}

fn seed_mandate(graph: &InMemoryGraph, uuid: &str, content: &str) {
    let mut node = EpisodeNode::new(uuid, "rule", content, "global");
    node.injection_tier = Some("mandate".into());
    node.source_description =
        "coding_standard mandate source:golden_standard confidence:100".into();
    graph.seed_episode(node);
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn single_turn_end_turn_succeeds() {
    let h = harness(Scripted::new(
        "scripted",
        vec![turn("All done.", FinishReason::EndTurn)],
    ));
    let result = h.runner.run("say hi", config()).await;

    assert_eq!(result.status, AgentStatus::Success);
    assert_eq!(result.content, "All done.");
    assert_eq!(result.turns, 1);
    assert_eq!(result.input_tokens, 100);
    assert_eq!(result.output_tokens, 50);
}

#[tokio::test]
async fn first_turn_injects_memory_when_relevant() {
    let adapter = Scripted::new(
        "scripted",
        vec![turn("Using async here.", FinishReason::EndTurn)],
    );
    let h = harness(adapter);
    seed_mandate(
        &h.graph,
        "a1b2c3d4-0000-0000-0000-000000000000",
        "should use asyncio for all concurrent IO work in services",
    );

    let result = h
        .runner
        .run("should I use asyncio for concurrent IO work", config())
        .await;

    assert_eq!(result.status, AgentStatus::Success);
    assert!(!result.memory_uuids.is_empty());
    // The injector enqueued `loaded` increments.
    h.usage.flush().await.unwrap();
    let node = h.graph.episode("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
    assert_eq!(node.loaded_count, 1);
}

#[tokio::test]
async fn citations_resolve_and_enqueue_references() {
    let adapter = Scripted::new(
        "scripted",
        vec![turn(
            "Per [M:a1b2c3d4], we prefer async.",
            FinishReason::EndTurn,
        )],
    );
    let h = harness(adapter);
    seed_mandate(
        &h.graph,
        "a1b2c3d4-0000-0000-0000-000000000000",
        "All I/O is async. Never use sync methods.",
    );

    let mut cfg = config();
    cfg.inject_memory = false;
    let result = h.runner.run("how should I do IO", cfg).await;

    assert_eq!(
        result.cited_uuids,
        vec!["a1b2c3d4-0000-0000-0000-000000000000".to_string()]
    );

    h.usage.flush().await.unwrap();
    let node = h.graph.episode("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
    assert_eq!(node.referenced_count, 1);
    assert!(node.last_used_at.is_some());
    assert_eq!(node.utility_score, 0.0); // no successes yet
}

#[tokio::test]
async fn tool_use_turn_continues_with_provider_sandbox() {
    let mut tool_turn = turn("Ran the search.", FinishReason::ToolUse);
    tool_turn.tool_calls = vec![ToolCall {
        call_id: "t1".into(),
        tool_name: "search_code".into(),
        arguments: serde_json::json!({"pattern": "fn main"}),
    }];
    let h = harness(Scripted::new(
        "scripted",
        vec![tool_turn, turn("Found it in main.rs.", FinishReason::EndTurn)],
    ));

    let mut cfg = config();
    cfg.inject_memory = false;
    let result = h.runner.run("find the entrypoint", cfg).await;

    assert_eq!(result.status, AgentStatus::Success);
    assert_eq!(result.turns, 2);
    assert_eq!(result.tool_calls_count, 1);
    assert_eq!(result.content, "Found it in main.rs.");
}

#[tokio::test]
async fn max_tokens_is_a_truncation_error() {
    let h = harness(Scripted::new(
        "scripted",
        vec![turn("partial...", FinishReason::MaxTokens)],
    ));
    let mut cfg = config();
    cfg.inject_memory = false;
    let result = h.runner.run("write a novel", cfg).await;

    assert_eq!(result.status, AgentStatus::Error);
    assert!(result.error.as_deref().unwrap().contains("truncated"));
    assert_eq!(result.content, "partial...");
}

#[tokio::test]
async fn max_turns_exhaustion_preserves_citations() {
    // Every turn stops on a stop sequence and cites the same rule.
    let turns: Vec<CompletionResult> = (0..3)
        .map(|_| turn("thinking [M:a1b2c3d4]", FinishReason::StopSequence))
        .collect();
    let h = harness(Scripted::new("scripted", turns));
    seed_mandate(
        &h.graph,
        "a1b2c3d4-0000-0000-0000-000000000000",
        "rule content",
    );

    let mut cfg = config();
    cfg.inject_memory = false;
    cfg.max_turns = 3;
    let result = h.runner.run("loop forever", cfg).await;

    assert_eq!(result.status, AgentStatus::MaxTurns);
    assert!(result.error.as_deref().unwrap().contains("maximum turns"));
    assert_eq!(result.turns, 3);
    assert_eq!(result.cited_uuids.len(), 1);
}

#[tokio::test]
async fn unknown_provider_errors_cleanly() {
    let h = harness(Scripted::new("scripted", vec![]));
    let mut cfg = config();
    cfg.provider = "missing".into();
    let result = h.runner.run("anything", cfg).await;
    assert_eq!(result.status, AgentStatus::Error);
    assert!(result.error.as_deref().unwrap().contains("unknown provider"));
}
