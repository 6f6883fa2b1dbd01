//! Memory statistics across scopes.

use ah_domain::scope::{build_group_id, MemoryScope, GLOBAL_GROUP_ID};
use ah_memory::stats::gather_stats;

use crate::state::AppState;

pub async fn run(state: &AppState, projects: &[String]) -> anyhow::Result<()> {
    let mut group_ids = vec![GLOBAL_GROUP_ID.to_string()];
    for project in projects {
        group_ids.push(build_group_id(MemoryScope::Project, Some(project)));
    }

    let stats = gather_stats(&state.graph, &group_ids).await?;

    println!("episodes          {}", stats.total_episodes);
    for (tier, count) in &stats.by_tier {
        println!("  {tier:<15} {count}");
    }
    for (group, count) in &stats.by_group {
        println!("  {group:<15} {count}");
    }
    println!("loaded total      {}", stats.total_loaded);
    println!("referenced total  {}", stats.total_referenced);
    println!("pinned            {}", stats.pinned_count);
    println!("un-indexed        {}", stats.unindexed_count);

    if let Some(ref audit) = state.audit {
        println!("tier changes      {}", audit.tier_change_count()?);
        println!("injections logged {}", audit.injection_metric_count()?);
    }
    Ok(())
}
