//! In-memory [`GraphStore`] double for test suites.
//!
//! Episodes live in a map; semantic search scores by token overlap between
//! the query and episode content, which is deterministic and good enough for
//! exercising dedup and selection paths. Tests that need exact similarity
//! scores (clustering gates, reinforcement thresholds) pre-seed canned
//! search results instead.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use ah_domain::error::Result;

use crate::store::{GraphStore, UsageDelta, UtilityShift};
use crate::types::{AddEpisodeRequest, AddEpisodeResult, EntityEdge, EpisodeNode};

#[derive(Default)]
struct Inner {
    episodes: HashMap<String, EpisodeNode>,
    /// (variation, canonical) pairs.
    refines_edges: Vec<(String, String)>,
    /// Canned search results, returned verbatim when set.
    canned_search: Option<Vec<EntityEdge>>,
    /// Simulate a backend outage: every call fails until cleared.
    fail_next: bool,
}

/// In-memory graph store for tests.
#[derive(Default)]
pub struct InMemoryGraph {
    inner: Mutex<Inner>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an episode directly (bypasses the ingestion funnel - tests only).
    pub fn seed_episode(&self, node: EpisodeNode) {
        self.inner.lock().episodes.insert(node.uuid.clone(), node);
    }

    /// Replace search output with canned edges.
    pub fn set_search_results(&self, edges: Vec<EntityEdge>) {
        self.inner.lock().canned_search = Some(edges);
    }

    /// Make every subsequent call fail until [`clear_failure`] is called.
    pub fn fail_all(&self) {
        self.inner.lock().fail_next = true;
    }

    pub fn clear_failure(&self) {
        self.inner.lock().fail_next = false;
    }

    pub fn episode(&self, uuid: &str) -> Option<EpisodeNode> {
        self.inner.lock().episodes.get(uuid).cloned()
    }

    pub fn episode_count(&self) -> usize {
        self.inner.lock().episodes.len()
    }

    pub fn refines_edges(&self) -> Vec<(String, String)> {
        self.inner.lock().refines_edges.clone()
    }

    fn check_failure(&self) -> Result<()> {
        if self.inner.lock().fail_next {
            return Err(ah_domain::error::Error::Graph(
                "simulated backend outage".into(),
            ));
        }
        Ok(())
    }
}

/// Token-overlap similarity in [0, 1]; identical normalized text scores 1.0.
fn token_overlap(a: &str, b: &str) -> f64 {
    let ta: std::collections::HashSet<String> =
        a.to_lowercase().split_whitespace().map(String::from).collect();
    let tb: std::collections::HashSet<String> =
        b.to_lowercase().split_whitespace().map(String::from).collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count() as f64;
    shared / ta.union(&tb).count() as f64
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn add_episode(&self, req: AddEpisodeRequest) -> Result<AddEpisodeResult> {
        self.check_failure()?;
        let uuid = Uuid::new_v4().to_string();
        let mut node = EpisodeNode::new(&uuid, &req.name, &req.episode_body, &req.group_id);
        node.source_description = req.source_description.clone();
        node.created_at = req.reference_time;
        node.valid_at = Some(req.reference_time);
        // Mirror the tier token out of the tag string so tier filters work.
        for tier in ["mandate", "guardrail", "reference"] {
            if req
                .source_description
                .split_whitespace()
                .any(|tok| tok == tier)
            {
                node.injection_tier = Some(tier.to_string());
            }
        }
        self.inner.lock().episodes.insert(uuid.clone(), node);
        Ok(AddEpisodeResult {
            episode_uuid: uuid,
            node_uuids: Vec::new(),
            edge_uuids: Vec::new(),
        })
    }

    async fn search(
        &self,
        query: &str,
        group_ids: &[String],
        num_results: usize,
    ) -> Result<Vec<EntityEdge>> {
        self.check_failure()?;
        let inner = self.inner.lock();

        if let Some(ref canned) = inner.canned_search {
            return Ok(canned
                .iter()
                .filter(|e| group_ids.contains(&e.group_id))
                .take(num_results)
                .cloned()
                .collect());
        }

        let mut edges: Vec<EntityEdge> = inner
            .episodes
            .values()
            .filter(|e| group_ids.contains(&e.group_id) && e.vector_indexed)
            .map(|e| EntityEdge {
                uuid: e.uuid.clone(),
                fact: e.content.clone(),
                group_id: e.group_id.clone(),
                created_at: e.created_at,
                score: token_overlap(query, &e.content),
                source_description: e.source_description.clone(),
                source_node_name: None,
                target_node_name: None,
                episodes: vec![e.uuid.clone()],
                injection_tier: e.injection_tier.clone(),
            })
            .collect();
        edges.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        edges.truncate(num_results);
        Ok(edges)
    }

    async fn retrieve_episodes(
        &self,
        reference_time: DateTime<Utc>,
        last_n: usize,
        group_ids: &[String],
    ) -> Result<Vec<EpisodeNode>> {
        self.check_failure()?;
        let inner = self.inner.lock();
        let mut episodes: Vec<EpisodeNode> = inner
            .episodes
            .values()
            .filter(|e| group_ids.contains(&e.group_id) && e.created_at <= reference_time)
            .cloned()
            .collect();
        episodes.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        episodes.truncate(last_n);
        Ok(episodes)
    }

    async fn remove_episode(&self, uuid: &str) -> Result<bool> {
        self.check_failure()?;
        Ok(self.inner.lock().episodes.remove(uuid).is_some())
    }

    async fn get_episode(&self, uuid: &str) -> Result<Option<EpisodeNode>> {
        self.check_failure()?;
        Ok(self.inner.lock().episodes.get(uuid).cloned())
    }

    async fn batch_get_episodes(&self, uuids: &[String]) -> Result<Vec<EpisodeNode>> {
        self.check_failure()?;
        let inner = self.inner.lock();
        Ok(uuids
            .iter()
            .filter_map(|u| inner.episodes.get(u).cloned())
            .collect())
    }

    async fn fetch_episodes_by_tier(
        &self,
        group_ids: &[String],
        tiers: &[&str],
    ) -> Result<Vec<EpisodeNode>> {
        self.check_failure()?;
        let inner = self.inner.lock();
        Ok(inner
            .episodes
            .values()
            .filter(|e| {
                group_ids.contains(&e.group_id)
                    && e.injection_tier
                        .as_deref()
                        .map(|t| tiers.contains(&t))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn set_episode_properties(
        &self,
        uuid: &str,
        props: serde_json::Map<String, Value>,
    ) -> Result<bool> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        let Some(node) = inner.episodes.get_mut(uuid) else {
            return Ok(false);
        };
        for (key, value) in props {
            match key.as_str() {
                "pinned" => node.pinned = value.as_bool().unwrap_or(node.pinned),
                "auto_inject" => node.auto_inject = value.as_bool().unwrap_or(node.auto_inject),
                "vector_indexed" => {
                    node.vector_indexed = value.as_bool().unwrap_or(node.vector_indexed)
                }
                "display_order" => node.display_order = value.as_i64(),
                "summary" => node.summary = value.as_str().map(str::to_string),
                "injection_tier" => node.injection_tier = value.as_str().map(str::to_string),
                "trigger_task_types" => {
                    if let Some(arr) = value.as_array() {
                        node.trigger_task_types = arr
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect();
                    }
                }
                _ => {}
            }
        }
        Ok(true)
    }

    async fn update_source_description(
        &self,
        uuid: &str,
        source_description: &str,
    ) -> Result<bool> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        match inner.episodes.get_mut(uuid) {
            Some(node) => {
                node.source_description = source_description.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply_usage_deltas(
        &self,
        deltas: &[UsageDelta],
        now: DateTime<Utc>,
    ) -> Result<Vec<UtilityShift>> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        let mut shifts = Vec::new();
        for delta in deltas {
            if let Some(node) = inner.episodes.get_mut(&delta.uuid) {
                let old_utility = node.utility_score;
                node.loaded_count += delta.loaded;
                node.referenced_count += delta.referenced;
                node.success_count += delta.success;
                node.helpful_count += delta.helpful;
                node.harmful_count += delta.harmful;
                node.last_used_at = Some(now);
                node.utility_score = if node.referenced_count > 0 {
                    node.success_count as f64 / node.referenced_count as f64
                } else {
                    0.0
                };
                shifts.push(UtilityShift {
                    uuid: delta.uuid.clone(),
                    old_utility,
                    new_utility: node.utility_score,
                    injection_tier: node.injection_tier.clone(),
                });
            }
        }
        Ok(shifts)
    }

    async fn resolve_uuid_prefix(&self, prefix: &str, group_id: &str) -> Result<Vec<String>> {
        self.check_failure()?;
        let inner = self.inner.lock();
        Ok(inner
            .episodes
            .values()
            .filter(|e| e.group_id == group_id && e.uuid.starts_with(prefix))
            .map(|e| e.uuid.clone())
            .collect())
    }

    async fn demote_episode(
        &self,
        uuid: &str,
        new_tier: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        match inner.episodes.get_mut(uuid) {
            Some(node) => {
                node.injection_tier = Some(new_tier.to_string());
                node.vector_indexed = false;
                node.demoted_at = Some(now);
                node.demotion_reason = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn promote_episode(
        &self,
        uuid: &str,
        new_tier: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        match inner.episodes.get_mut(uuid) {
            Some(node) => {
                node.injection_tier = Some(new_tier.to_string());
                node.promoted_at = Some(now);
                node.promotion_reason = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn merge_synonym(&self, uuid: &str, synonym: &str) -> Result<Option<usize>> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        match inner.episodes.get_mut(uuid) {
            Some(node) => {
                if !node.synonyms.iter().any(|s| s == synonym) {
                    node.synonyms.push(synonym.to_string());
                }
                node.ref_count = node.ref_count.max(1) + 1;
                Ok(Some(node.synonyms.len()))
            }
            None => Ok(None),
        }
    }

    async fn create_refines_edge(
        &self,
        variation_uuid: &str,
        canonical_uuid: &str,
    ) -> Result<bool> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        let both_exist = inner.episodes.contains_key(variation_uuid)
            && inner.episodes.contains_key(canonical_uuid);
        if both_exist {
            inner
                .refines_edges
                .push((variation_uuid.to_string(), canonical_uuid.to_string()));
        }
        Ok(both_exist)
    }

    async fn create_correction(
        &self,
        original_uuid: &str,
        correction_content: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        let Some(original) = inner.episodes.get(original_uuid).cloned() else {
            return Ok(None);
        };

        let correction_uuid = Uuid::new_v4().to_string();
        let mut correction = EpisodeNode::new(
            &correction_uuid,
            format!("correction_{}", original.name),
            correction_content,
            &original.group_id,
        );
        correction.injection_tier = original.injection_tier.clone();
        correction.created_at = now;
        correction.is_correction = true;
        correction.corrects_uuid = Some(original_uuid.to_string());
        inner
            .episodes
            .insert(correction_uuid.clone(), correction);

        let original = inner.episodes.get_mut(original_uuid).unwrap();
        original.vector_indexed = false;
        original.has_correction = true;
        original.correction_uuid = Some(correction_uuid.clone());
        original.demotion_reason = Some(reason.to_string());

        Ok(Some(correction_uuid))
    }

    async fn execute_query(&self, _query: &str, _params: Value) -> Result<Vec<Value>> {
        self.check_failure()?;
        Ok(Vec::new())
    }

    async fn health_check(&self) -> Result<()> {
        self.check_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_req(content: &str, group: &str, desc: &str) -> AddEpisodeRequest {
        AddEpisodeRequest {
            name: "test".into(),
            episode_body: content.into(),
            source_type: "text".into(),
            source_description: desc.into(),
            reference_time: Utc::now(),
            group_id: group.into(),
        }
    }

    #[tokio::test]
    async fn add_and_get_roundtrip() {
        let g = InMemoryGraph::new();
        let result = g
            .add_episode(add_req("All I/O is async.", "global", "coding_standard mandate"))
            .await
            .unwrap();
        let node = g.get_episode(&result.episode_uuid).await.unwrap().unwrap();
        assert_eq!(node.content, "All I/O is async.");
        assert_eq!(node.injection_tier.as_deref(), Some("mandate"));
    }

    #[tokio::test]
    async fn search_scopes_by_group() {
        let g = InMemoryGraph::new();
        g.add_episode(add_req("rust ownership rules", "global", "reference"))
            .await
            .unwrap();
        g.add_episode(add_req("rust ownership rules", "project-x", "reference"))
            .await
            .unwrap();

        let hits = g
            .search("rust ownership", &["global".into()], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].group_id, "global");
    }

    #[tokio::test]
    async fn usage_deltas_update_counters_and_utility() {
        let g = InMemoryGraph::new();
        let r = g
            .add_episode(add_req("fact", "global", "reference"))
            .await
            .unwrap();
        let delta = UsageDelta {
            uuid: r.episode_uuid.clone(),
            loaded: 3,
            referenced: 2,
            success: 1,
            ..Default::default()
        };
        let shifts = g.apply_usage_deltas(&[delta], Utc::now()).await.unwrap();
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].old_utility, 0.0);
        assert!((shifts[0].new_utility - 0.5).abs() < f64::EPSILON);

        let node = g.episode(&r.episode_uuid).unwrap();
        assert_eq!(node.loaded_count, 3);
        assert_eq!(node.referenced_count, 2);
        assert!((node.utility_score - 0.5).abs() < f64::EPSILON);
        assert!(node.last_used_at.is_some());
    }

    #[tokio::test]
    async fn correction_replaces_original() {
        let g = InMemoryGraph::new();
        let r = g
            .add_episode(add_req("wrong advice", "global", "guardrail"))
            .await
            .unwrap();
        let correction = g
            .create_correction(&r.episode_uuid, "right advice", "harmful_rating_majority", Utc::now())
            .await
            .unwrap()
            .unwrap();

        let original = g.episode(&r.episode_uuid).unwrap();
        assert!(!original.vector_indexed);
        assert!(original.has_correction);
        assert_eq!(original.correction_uuid.as_deref(), Some(correction.as_str()));

        let corr = g.episode(&correction).unwrap();
        assert!(corr.is_correction);
        assert_eq!(corr.corrects_uuid.as_deref(), Some(r.episode_uuid.as_str()));
    }
}
