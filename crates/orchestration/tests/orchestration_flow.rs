//! Orchestration integration tests over scripted adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ah_domain::completion::{CompletionRequest, CompletionResult, FinishReason};
use ah_domain::error::{Error, Result};
use ah_domain::stream::{BoxStream, StreamEvent};
use ah_orchestration::parallel::{ParallelStatus, DEFAULT_MAX_CONCURRENCY};
use ah_orchestration::subagent::SubagentStatus;
use ah_orchestration::{MakerChecker, ParallelExecutor, ParallelTask, SubagentConfig, SubagentManager};
use ah_providers::registry::ProviderRegistry;
use ah_providers::{AgentMessage, ProviderAdapter, ToolLoopRequest};

// ── Scripted adapter ───────────────────────────────────────────────

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<CompletionResult> + Send + Sync>;

struct Scripted {
    name: String,
    delay: Duration,
    responder: Responder,
}

impl Scripted {
    fn new(name: &str, delay: Duration, responder: Responder) -> Self {
        Self {
            name: name.into(),
            delay,
            responder,
        }
    }
}

fn reply(content: &str, output_tokens: u32) -> CompletionResult {
    CompletionResult {
        content: content.into(),
        model: "scripted".into(),
        provider: "scripted".into(),
        input_tokens: 10,
        output_tokens,
        finish_reason: FinishReason::EndTurn,
        thinking_content: None,
        thinking_tokens: None,
        tool_calls: Vec::new(),
        container: None,
        cache_metrics: None,
    }
}

fn prompt_text(req: &CompletionRequest) -> String {
    req.messages
        .iter()
        .map(|m| m.content.extract_all_text())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ProviderAdapter for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn auth_mode(&self) -> &str {
        "none"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResult> {
        tokio::time::sleep(self.delay).await;
        (self.responder)(&req)
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

fn manager_with(adapter: Scripted) -> Arc<SubagentManager> {
    let registry = Arc::new(ProviderRegistry::from_adapters(
        vec![Arc::new(adapter)],
        "scripted",
    ));
    Arc::new(SubagentManager::new(registry))
}

fn config() -> SubagentConfig {
    SubagentConfig {
        provider: "scripted".into(),
        ..Default::default()
    }
}

// ── Subagent ───────────────────────────────────────────────────────

#[tokio::test]
async fn subagent_isolated_context_completes() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|req| {
            assert!(prompt_text(req).contains("summarize the design"));
            Ok(reply("done", 12))
        }),
    ));

    let result = manager
        .spawn("summarize the design", &config(), None, None, None)
        .await;
    assert_eq!(result.status, SubagentStatus::Completed);
    assert_eq!(result.content, "done");
    assert_eq!(result.output_tokens, 12);
}

#[tokio::test]
async fn subagent_timeout_is_terminal_status_not_panic() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::from_secs(5),
        Box::new(|_| Ok(reply("late", 1))),
    ));
    let mut cfg = config();
    cfg.timeout_secs = 1;

    tokio::time::pause();
    let spawn = manager.spawn("slow task", &cfg, None, None, None);
    tokio::pin!(spawn);
    tokio::time::advance(Duration::from_secs(2)).await;
    let result = spawn.await;

    assert_eq!(result.status, SubagentStatus::Timeout);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn background_spawn_and_cancel() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::from_millis(50),
        Box::new(|_| Ok(reply("bg done", 5))),
    ));

    let id = manager.spawn_background(
        "background task".into(),
        config(),
        None,
        None,
        None,
    );
    assert_eq!(manager.active_count(), 1);
    let result = manager.get_result(&id, None).await.unwrap();
    assert_eq!(result.status, SubagentStatus::Completed);
    assert_eq!(manager.active_count(), 0);

    let id2 = manager.spawn_background("another".into(), config(), None, None, None);
    assert!(manager.cancel(&id2));
    assert!(!manager.cancel(&id2));
}

// ── Parallel ───────────────────────────────────────────────────────

#[tokio::test]
async fn map_accumulates_token_totals() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|req| {
            let prompt = prompt_text(req);
            let tokens = if prompt.contains("fr") {
                20
            } else if prompt.contains("es") {
                30
            } else {
                25
            };
            Ok(reply("hi", tokens))
        }),
    ));
    let executor = ParallelExecutor::new(manager, DEFAULT_MAX_CONCURRENCY);

    let result = executor
        .map(
            "Say hi in {item}",
            &["fr".into(), "es".into(), "de".into()],
            &config(),
            None,
        )
        .await;

    assert_eq!(result.status, ParallelStatus::AllCompleted);
    assert_eq!(result.completed_count(), 3);
    assert_eq!(result.total_output_tokens, 75);
}

#[tokio::test]
async fn fail_fast_cancels_sleeping_siblings() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|req| {
            let prompt = prompt_text(req);
            if prompt.contains("poison") {
                Err(Error::Provider {
                    provider: "scripted".into(),
                    message: "boom".into(),
                    retriable: false,
                })
            } else {
                // Siblings sleep long enough that fail-fast beats them.
                std::thread::sleep(Duration::from_millis(5));
                Ok(reply("slept", 1))
            }
        }),
    ));
    // Concurrency 1 guarantees the poison task (first) resolves before the
    // sleepers start.
    let executor = ParallelExecutor::new(manager, 1);

    let tasks: Vec<ParallelTask> = std::iter::once("poison")
        .chain(std::iter::repeat("sleep").take(4))
        .map(|t| ParallelTask::new(t, config()))
        .collect();

    let result = executor.execute(tasks, None, true).await;
    assert!(matches!(
        result.status,
        ParallelStatus::Partial | ParallelStatus::AllFailed
    ));
    assert!(result.results.len() < 5);
    assert!(result.failed_count() >= 1);
}

#[tokio::test]
async fn overall_timeout_returns_partial_results() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::from_secs(10),
        Box::new(|_| Ok(reply("late", 1))),
    ));
    let executor = ParallelExecutor::new(manager, 4);

    tokio::time::pause();
    let tasks = (0..3)
        .map(|i| ParallelTask::new(format!("task {i}"), config()))
        .collect();
    let run = executor.execute(tasks, Some(Duration::from_secs(1)), false);
    tokio::pin!(run);
    tokio::time::advance(Duration::from_secs(2)).await;
    let result = run.await;

    assert_eq!(result.status, ParallelStatus::Timeout);
    assert_eq!(result.completed_count(), 0);
}

#[tokio::test]
async fn empty_task_list_is_trivially_complete() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|_| Ok(reply("unused", 0))),
    ));
    let executor = ParallelExecutor::new(manager, 2);
    let result = executor.execute(Vec::new(), None, false).await;
    assert_eq!(result.status, ParallelStatus::AllCompleted);
    assert!(result.results.is_empty());
}

// ── Maker-checker ──────────────────────────────────────────────────

#[tokio::test]
async fn maker_checker_approves_first_round() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|req| {
            let prompt = prompt_text(req);
            if prompt.contains("Review the following output") {
                Ok(reply("DECISION: APPROVED\nCONFIDENCE: 0.95", 5))
            } else {
                Ok(reply("fn add(a: i32, b: i32) -> i32 { a + b }", 15))
            }
        }),
    ));

    let mc = MakerChecker::new(manager, config(), config(), 3);
    let result = mc.verify("write an add function").await;

    assert!(result.approved);
    assert_eq!(result.iterations, 1);
    assert!(result.final_output.contains("fn add"));
    assert_eq!(result.confidence, 0.95);
}

#[tokio::test]
async fn maker_checker_terminates_when_never_approved() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|req| {
            let prompt = prompt_text(req);
            if prompt.contains("Review the following output") {
                Ok(reply(
                    "DECISION: NEEDS_REVISION\nCONFIDENCE: 0.4\nISSUES:\n- wrong\nSUGGESTIONS:\n- fix it",
                    5,
                ))
            } else {
                Ok(reply("attempt", 5))
            }
        }),
    ));

    let mc = MakerChecker::new(manager, config(), config(), 3);
    let result = mc.verify("impossible task").await;

    assert!(!result.approved);
    assert_eq!(result.iterations, 3);
    assert_eq!(result.issues, vec!["wrong"]);
    assert_eq!(result.final_output, "attempt");
}

#[tokio::test]
async fn maker_checker_revision_embeds_feedback() {
    let manager = manager_with(Scripted::new(
        "scripted",
        Duration::ZERO,
        Box::new(|req| {
            let prompt = prompt_text(req);
            if prompt.contains("Review the following output") {
                if prompt.contains("revised attempt") {
                    Ok(reply("DECISION: APPROVED\nCONFIDENCE: 0.9", 5))
                } else {
                    Ok(reply(
                        "DECISION: NEEDS_REVISION\nCONFIDENCE: 0.5\nISSUES:\n- missing tests",
                        5,
                    ))
                }
            } else if prompt.contains("ISSUES IDENTIFIED") {
                assert!(prompt.contains("missing tests"));
                Ok(reply("revised attempt", 8))
            } else {
                Ok(reply("first attempt", 8))
            }
        }),
    ));

    let mc = MakerChecker::new(manager, config(), config(), 3);
    let result = mc.verify("write code with tests").await;

    assert!(result.approved);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.final_output, "revised attempt");
}
