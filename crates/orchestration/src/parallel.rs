//! Bounded-concurrency parallel execution of subagents.
//!
//! A semaphore caps in-flight subagents. Results are collated by
//! completion with explicit indices - there is no cross-task ordering.
//! `fail_fast` cancels the remaining siblings on the first failure; the
//! overall timeout cancels everything pending and returns whatever partial
//! results exist.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use ah_domain::message::Message;

use crate::subagent::{SubagentConfig, SubagentManager, SubagentResult, SubagentStatus};

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One task for parallel execution.
#[derive(Debug, Clone)]
pub struct ParallelTask {
    pub task: String,
    pub config: SubagentConfig,
    pub context: Option<Vec<Message>>,
    pub id: Option<String>,
}

impl ParallelTask {
    pub fn new(task: impl Into<String>, config: SubagentConfig) -> Self {
        Self {
            task: task.into(),
            config,
            context: None,
            id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStatus {
    AllCompleted,
    Partial,
    AllFailed,
    Timeout,
}

/// Aggregate result. `results` pairs each completion with its task index.
#[derive(Debug, Clone, Serialize)]
pub struct ParallelResult {
    pub results: Vec<(usize, SubagentResult)>,
    pub status: ParallelStatus,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ParallelResult {
    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| r.status == SubagentStatus::Completed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r.status, SubagentStatus::Error | SubagentStatus::Timeout))
            .count()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ParallelExecutor {
    manager: Arc<SubagentManager>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

impl ParallelExecutor {
    pub fn new(manager: Arc<SubagentManager>, max_concurrency: usize) -> Self {
        Self {
            manager,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Execute tasks in parallel.
    pub async fn execute(
        &self,
        tasks: Vec<ParallelTask>,
        overall_timeout: Option<Duration>,
        fail_fast: bool,
    ) -> ParallelResult {
        let started_at = Utc::now();
        if tasks.is_empty() {
            return ParallelResult {
                results: Vec::new(),
                status: ParallelStatus::AllCompleted,
                total_input_tokens: 0,
                total_output_tokens: 0,
                started_at,
                completed_at: Some(Utc::now()),
            };
        }

        let task_count = tasks.len();
        tracing::info!(
            tasks = task_count,
            max_concurrency = self.max_concurrency,
            fail_fast,
            "starting parallel execution"
        );

        let mut join_set: JoinSet<(usize, SubagentResult)> = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let manager = self.manager.clone();
            let semaphore = self.semaphore.clone();
            join_set.spawn(async move {
                // Closing the semaphore is not part of this flow; a failed
                // acquire only happens on shutdown.
                let _permit = semaphore.acquire().await;
                let result = manager
                    .spawn(&task.task, &task.config, task.context, None, task.id)
                    .await;
                (index, result)
            });
        }

        let mut results: Vec<(usize, SubagentResult)> = Vec::new();
        let mut timed_out = false;

        let deadline = overall_timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            timed_out = true;
                            join_set.abort_all();
                            break;
                        }
                    }
                }
                None => join_set.join_next().await,
            };

            match next {
                Some(Ok((index, result))) => {
                    let failed = matches!(
                        result.status,
                        SubagentStatus::Error | SubagentStatus::Timeout
                    );
                    results.push((index, result));
                    if fail_fast && failed {
                        tracing::warn!(index, "fail-fast triggered, cancelling siblings");
                        join_set.abort_all();
                        break;
                    }
                }
                Some(Err(e)) => {
                    // A panicked/cancelled child is not fatal to the batch.
                    tracing::warn!(error = %e, "parallel child join error");
                }
                None => break,
            }
        }
        // Drain whatever the abort left behind.
        while let Some(joined) = join_set.join_next().await {
            if let Ok((index, result)) = joined {
                results.push((index, result));
            }
        }

        let completed = results
            .iter()
            .filter(|(_, r)| r.status == SubagentStatus::Completed)
            .count();
        let status = if timed_out {
            ParallelStatus::Timeout
        } else if completed == task_count {
            ParallelStatus::AllCompleted
        } else if completed == 0 {
            ParallelStatus::AllFailed
        } else {
            ParallelStatus::Partial
        };

        let result = ParallelResult {
            total_input_tokens: results.iter().map(|(_, r)| r.input_tokens).sum(),
            total_output_tokens: results.iter().map(|(_, r)| r.output_tokens).sum(),
            results,
            status,
            started_at,
            completed_at: Some(Utc::now()),
        };

        tracing::info!(
            completed,
            total = task_count,
            status = ?result.status,
            input_tokens = result.total_input_tokens,
            output_tokens = result.total_output_tokens,
            "parallel execution finished"
        );
        result
    }

    /// Fan a task template out over items. `{item}` in the template is
    /// replaced per item; each child gets an indexed name.
    pub async fn map(
        &self,
        task_template: &str,
        items: &[String],
        config: &SubagentConfig,
        overall_timeout: Option<Duration>,
    ) -> ParallelResult {
        let tasks: Vec<ParallelTask> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut child_config = config.clone();
                child_config.name = format!("{}_{i}", config.name);
                ParallelTask {
                    task: task_template.replace("{item}", item),
                    config: child_config,
                    context: None,
                    id: Some(i.to_string()),
                }
            })
            .collect();

        self.execute(tasks, overall_timeout, false).await
    }
}
