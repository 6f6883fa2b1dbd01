//! One tier-optimization cycle over global + requested project scopes.

use ah_domain::scope::{build_group_id, MemoryScope};

use crate::state::AppState;

pub async fn run(state: &AppState, projects: &[String]) -> anyhow::Result<()> {
    let mut group_ids = vec![ah_domain::scope::GLOBAL_GROUP_ID.to_string()];
    for project in projects {
        group_ids.push(build_group_id(MemoryScope::Project, Some(project)));
    }

    let summary = state.optimizer.optimize(&group_ids).await?;
    println!(
        "optimization complete: {} demotions, {} promotions, {} errors",
        summary.demotions, summary.promotions, summary.errors
    );

    // Counter movement may have shifted the mandate index.
    state.index.invalidate();

    // Stale-session hygiene rides along with the periodic job.
    let swept = state.sessions.cleanup_stale();
    if swept > 0 {
        println!("swept {swept} stale session states");
    }

    Ok(())
}
