//! Consolidate a completed task's memories.

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    task_id: &str,
    success: bool,
    project: Option<&str>,
    summary: Option<&str>,
) -> anyhow::Result<()> {
    let result = state
        .consolidator
        .consolidate(task_id, success, project, summary)
        .await?;

    println!(
        "task {}: promoted {}, deleted {}, crystallized {}",
        result.task_id, result.promoted_count, result.deleted_count, result.crystallized_count
    );
    Ok(())
}
