//! Scope-bound memory service facade.
//!
//! One `MemoryService` per group id: enriched semantic search (edges joined
//! with their backing episode counters), episode operations (pin,
//! auto-inject, delete, TTL cleanup), and listing. Construction is an
//! idempotent factory - the hub caches one service per scope.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use ah_domain::error::Result;
use ah_domain::scope::{build_group_id, MemoryScope, GLOBAL_GROUP_ID};
use ah_domain::tier::InjectionTier;
use ah_graph::{EpisodeNode, GraphStore};

use crate::source_desc::SourceTags;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A search hit enriched with the backing episode's counters and parsed
/// source tags - everything the scorer needs.
#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub uuid: String,
    pub content: String,
    /// Semantic similarity reported by the vector search.
    pub similarity: f64,
    pub tier: InjectionTier,
    pub confidence: f64,
    pub loaded_count: u64,
    pub referenced_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub trigger_task_types: Vec<String>,
    pub source_description: String,
}

impl MemorySearchResult {
    /// Build from an episode node plus a similarity score.
    pub fn from_episode(node: &EpisodeNode, similarity: f64) -> Self {
        let tags = SourceTags::parse(&node.source_description);
        let tier = node
            .injection_tier
            .as_deref()
            .and_then(|t| t.parse().ok())
            .or(tags.tier)
            .unwrap_or(InjectionTier::Reference);
        Self {
            uuid: node.uuid.clone(),
            content: node.content.clone(),
            similarity,
            tier,
            confidence: tags.confidence.unwrap_or(50.0),
            loaded_count: node.loaded_count,
            referenced_count: node.referenced_count,
            created_at: Some(node.created_at),
            last_used_at: node.last_used_at,
            pinned: node.pinned,
            trigger_task_types: node.trigger_task_types.clone(),
            source_description: node.source_description.clone(),
        }
    }

    pub fn is_golden(&self) -> bool {
        SourceTags::parse(&self.source_description).is_golden()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryService {
    graph: Arc<dyn GraphStore>,
    scope: MemoryScope,
    group_id: String,
}

impl MemoryService {
    pub fn new(graph: Arc<dyn GraphStore>, scope: MemoryScope, scope_id: Option<&str>) -> Self {
        let group_id = build_group_id(scope, scope_id);
        Self {
            graph,
            scope,
            group_id,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn scope(&self) -> MemoryScope {
        self.scope
    }

    pub fn graph(&self) -> Arc<dyn GraphStore> {
        self.graph.clone()
    }

    /// Group ids for reads: the own scope, folding in global for project
    /// scopes when requested. Cross-scope reads are always explicit.
    pub fn read_group_ids(&self, include_global: bool) -> Vec<String> {
        let mut ids = vec![self.group_id.clone()];
        if include_global && self.group_id != GLOBAL_GROUP_ID {
            ids.push(GLOBAL_GROUP_ID.to_string());
        }
        ids
    }

    // ── Search ───────────────────────────────────────────────────────

    /// Semantic search, joined with episode counters.
    ///
    /// Edges carry the similarity score; the backing episodes carry the
    /// counters that feed scoring. Episodes with `vector_indexed=false`
    /// never surface here (they remain retrievable by UUID).
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        include_global: bool,
    ) -> Result<Vec<MemorySearchResult>> {
        let group_ids = self.read_group_ids(include_global);
        let edges = self.graph.search(query, &group_ids, limit).await?;

        // Join each edge with its first backing episode.
        let episode_uuids: Vec<String> = edges
            .iter()
            .filter_map(|e| e.episodes.first().cloned())
            .collect();
        let episodes = self.graph.batch_get_episodes(&episode_uuids).await?;
        let by_uuid: HashMap<&str, &EpisodeNode> =
            episodes.iter().map(|e| (e.uuid.as_str(), e)).collect();

        let mut results = Vec::with_capacity(edges.len());
        for edge in &edges {
            let backing = edge
                .episodes
                .first()
                .and_then(|u| by_uuid.get(u.as_str()).copied());
            match backing {
                Some(node) if !node.vector_indexed => continue,
                Some(node) => results.push(MemorySearchResult::from_episode(node, edge.score)),
                None => {
                    // Edge without a resolvable episode: still usable, with
                    // tag-derived metadata only.
                    let tags = SourceTags::parse(&edge.source_description);
                    results.push(MemorySearchResult {
                        uuid: edge.uuid.clone(),
                        content: edge.fact.clone(),
                        similarity: edge.score,
                        tier: edge
                            .injection_tier
                            .as_deref()
                            .and_then(|t| t.parse().ok())
                            .or(tags.tier)
                            .unwrap_or(InjectionTier::Reference),
                        confidence: tags.confidence.unwrap_or(50.0),
                        loaded_count: 0,
                        referenced_count: 0,
                        created_at: Some(edge.created_at),
                        last_used_at: None,
                        pinned: false,
                        trigger_task_types: Vec::new(),
                        source_description: edge.source_description.clone(),
                    });
                }
            }
        }
        Ok(results)
    }

    /// Episodes in one tier across the readable groups, excluding nodes the
    /// search index no longer serves.
    pub async fn episodes_in_tier(
        &self,
        tier: InjectionTier,
        include_global: bool,
    ) -> Result<Vec<EpisodeNode>> {
        let group_ids = self.read_group_ids(include_global);
        let mut nodes = self
            .graph
            .fetch_episodes_by_tier(&group_ids, &[tier.as_str()])
            .await?;
        nodes.retain(|n| n.vector_indexed);
        Ok(nodes)
    }

    // ── Episode operations ───────────────────────────────────────────

    pub async fn get_episode(&self, uuid: &str) -> Result<Option<EpisodeNode>> {
        self.graph.get_episode(uuid).await
    }

    pub async fn list_episodes(&self, last_n: usize) -> Result<Vec<EpisodeNode>> {
        self.graph
            .retrieve_episodes(Utc::now(), last_n, &[self.group_id.clone()])
            .await
    }

    pub async fn delete_episode(&self, uuid: &str) -> Result<bool> {
        self.graph.remove_episode(uuid).await
    }

    pub async fn bulk_delete(&self, uuids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for uuid in uuids {
            if self.graph.remove_episode(uuid).await? {
                deleted += 1;
            }
        }
        tracing::info!(deleted, requested = uuids.len(), "bulk delete complete");
        Ok(deleted)
    }

    /// Pin or unpin an episode. Pinned episodes are exempt from demotion
    /// and token-budget eviction.
    pub async fn set_pinned(&self, uuid: &str, pinned: bool) -> Result<bool> {
        let mut props = serde_json::Map::new();
        props.insert("pinned".into(), json!(pinned));
        self.graph.set_episode_properties(uuid, props).await
    }

    pub async fn set_auto_inject(
        &self,
        uuid: &str,
        auto_inject: bool,
        display_order: Option<i64>,
    ) -> Result<bool> {
        let mut props = serde_json::Map::new();
        props.insert("auto_inject".into(), json!(auto_inject));
        if let Some(order) = display_order {
            props.insert("display_order".into(), json!(order));
        }
        self.graph.set_episode_properties(uuid, props).await
    }

    pub async fn set_trigger_task_types(&self, uuid: &str, task_types: &[String]) -> Result<bool> {
        let mut props = serde_json::Map::new();
        props.insert(
            "trigger_task_types".into(),
            Value::Array(task_types.iter().map(|t| json!(t)).collect()),
        );
        self.graph.set_episode_properties(uuid, props).await
    }

    /// TTL cleanup: delete stale, never-referenced, unpinned reference-tier
    /// episodes older than `ttl_days`. Returns the number removed.
    pub async fn cleanup_stale(&self, ttl_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(ttl_days);
        let nodes = self
            .graph
            .fetch_episodes_by_tier(&[self.group_id.clone()], &["reference"])
            .await?;

        let mut removed = 0;
        for node in nodes {
            let last_activity = node.last_used_at.unwrap_or(node.created_at);
            if node.pinned || node.referenced_count > 0 || last_activity > cutoff {
                continue;
            }
            if self.graph.remove_episode(&node.uuid).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, ttl_days, group_id = %self.group_id, "stale memory cleanup");
        }
        Ok(removed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Idempotent per-scope factory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cache of memory services keyed by group id.
pub struct MemoryServices {
    graph: Arc<dyn GraphStore>,
    services: Mutex<HashMap<String, Arc<MemoryService>>>,
}

impl MemoryServices {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            graph,
            services: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the service for a scope. Same scope → same instance.
    pub fn for_scope(&self, scope: MemoryScope, scope_id: Option<&str>) -> Arc<MemoryService> {
        let group_id = build_group_id(scope, scope_id);
        let mut services = self.services.lock();
        services
            .entry(group_id)
            .or_insert_with(|| Arc::new(MemoryService::new(self.graph.clone(), scope, scope_id)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_graph::testing::InMemoryGraph;
    use ah_graph::AddEpisodeRequest;

    async fn graph_with(content: &str, desc: &str, group: &str) -> (Arc<InMemoryGraph>, String) {
        let graph = Arc::new(InMemoryGraph::new());
        let uuid = graph
            .add_episode(AddEpisodeRequest {
                name: "n".into(),
                episode_body: content.into(),
                source_type: "text".into(),
                source_description: desc.into(),
                reference_time: Utc::now(),
                group_id: group.into(),
            })
            .await
            .unwrap()
            .episode_uuid;
        (graph, uuid)
    }

    #[tokio::test]
    async fn search_joins_counters() {
        let (graph, uuid) = graph_with(
            "async io everywhere",
            "coding_standard mandate source:golden_standard confidence:100",
            "global",
        )
        .await;
        graph
            .apply_usage_deltas(
                &[ah_graph::UsageDelta {
                    uuid: uuid.clone(),
                    loaded: 4,
                    referenced: 2,
                    ..Default::default()
                }],
                Utc::now(),
            )
            .await
            .unwrap();

        let svc = MemoryService::new(graph, MemoryScope::Global, None);
        let results = svc.search("async io", 10, false).await.unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.loaded_count, 4);
        assert_eq!(r.referenced_count, 2);
        assert_eq!(r.confidence, 100.0);
        assert_eq!(r.tier, InjectionTier::Mandate);
        assert!(r.is_golden());
    }

    #[tokio::test]
    async fn project_scope_folds_in_global_on_request() {
        let graph = Arc::new(InMemoryGraph::new());
        for group in ["global", "project-alpha"] {
            graph
                .add_episode(AddEpisodeRequest {
                    name: "n".into(),
                    episode_body: "shared naming convention".into(),
                    source_type: "text".into(),
                    source_description: "reference".into(),
                    reference_time: Utc::now(),
                    group_id: group.into(),
                })
                .await
                .unwrap();
        }

        let svc = MemoryService::new(graph, MemoryScope::Project, Some("alpha"));
        let own_only = svc.search("naming convention", 10, false).await.unwrap();
        assert_eq!(own_only.len(), 1);
        let folded = svc.search("naming convention", 10, true).await.unwrap();
        assert_eq!(folded.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_stale_spares_pinned_and_referenced() {
        let graph = Arc::new(InMemoryGraph::new());
        let old = Utc::now() - Duration::days(90);

        let mut stale = EpisodeNode::new("stale-1", "s", "old unused fact", "global");
        stale.injection_tier = Some("reference".into());
        stale.created_at = old;
        graph.seed_episode(stale);

        let mut pinned = EpisodeNode::new("pin-1", "p", "old pinned fact", "global");
        pinned.injection_tier = Some("reference".into());
        pinned.created_at = old;
        pinned.pinned = true;
        graph.seed_episode(pinned);

        let mut referenced = EpisodeNode::new("ref-1", "r", "old cited fact", "global");
        referenced.injection_tier = Some("reference".into());
        referenced.created_at = old;
        referenced.referenced_count = 3;
        graph.seed_episode(referenced);

        let svc = MemoryService::new(graph.clone(), MemoryScope::Global, None);
        let removed = svc.cleanup_stale(30).await.unwrap();
        assert_eq!(removed, 1);
        assert!(graph.episode("stale-1").is_none());
        assert!(graph.episode("pin-1").is_some());
        assert!(graph.episode("ref-1").is_some());
    }

    #[tokio::test]
    async fn factory_returns_same_instance_per_scope() {
        let graph = Arc::new(InMemoryGraph::new());
        let services = MemoryServices::new(graph);
        let a = services.for_scope(MemoryScope::Project, Some("x"));
        let b = services.for_scope(MemoryScope::Project, Some("x"));
        assert!(Arc::ptr_eq(&a, &b));
        let c = services.for_scope(MemoryScope::Global, None);
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
