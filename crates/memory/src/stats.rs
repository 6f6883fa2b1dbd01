//! Memory statistics for the doctor command and admin surfaces.

use std::collections::BTreeMap;
use std::sync::Arc;

use ah_domain::error::Result;
use ah_graph::GraphStore;

/// Per-group breakdown of the knowledge store.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MemoryStats {
    pub total_episodes: usize,
    /// tier → count.
    pub by_tier: BTreeMap<String, usize>,
    /// group → count.
    pub by_group: BTreeMap<String, usize>,
    pub total_loaded: u64,
    pub total_referenced: u64,
    pub pinned_count: usize,
    pub unindexed_count: usize,
}

/// Gather stats across the given groups.
pub async fn gather_stats(graph: &Arc<dyn GraphStore>, group_ids: &[String]) -> Result<MemoryStats> {
    let nodes = graph
        .fetch_episodes_by_tier(group_ids, &["mandate", "guardrail", "reference"])
        .await?;

    let mut stats = MemoryStats {
        total_episodes: nodes.len(),
        ..Default::default()
    };

    for node in &nodes {
        let tier = node.injection_tier.clone().unwrap_or_else(|| "untiered".into());
        *stats.by_tier.entry(tier).or_default() += 1;
        *stats.by_group.entry(node.group_id.clone()).or_default() += 1;
        stats.total_loaded += node.loaded_count;
        stats.total_referenced += node.referenced_count;
        if node.pinned {
            stats.pinned_count += 1;
        }
        if !node.vector_indexed {
            stats.unindexed_count += 1;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_graph::testing::InMemoryGraph;
    use ah_graph::EpisodeNode;

    #[tokio::test]
    async fn stats_break_down_by_tier_and_group() {
        let graph = Arc::new(InMemoryGraph::new());
        for (uuid, tier, group) in [
            ("a", "mandate", "global"),
            ("b", "guardrail", "global"),
            ("c", "reference", "project-x"),
        ] {
            let mut n = EpisodeNode::new(uuid, uuid, "content", group);
            n.injection_tier = Some(tier.into());
            n.loaded_count = 5;
            n.referenced_count = 2;
            graph.seed_episode(n);
        }

        let graph: Arc<dyn GraphStore> = graph;
        let stats = gather_stats(&graph, &["global".into(), "project-x".into()])
            .await
            .unwrap();
        assert_eq!(stats.total_episodes, 3);
        assert_eq!(stats.by_tier["mandate"], 1);
        assert_eq!(stats.by_group["global"], 2);
        assert_eq!(stats.total_loaded, 15);
        assert_eq!(stats.total_referenced, 6);
    }
}
