//! Canonical clustering - LLM-gated dedup for golden standards.
//!
//! On ingestion of a new golden standard, a ≥ 0.85 similarity match against
//! an existing golden triggers a cheap LLM call to classify the pair:
//! a *rephrase* (same meaning) merges into the canonical's synonyms, a
//! *variation* (adds nuance) becomes a new episode linked to the canonical
//! with a `REFINES` edge. An unparseable classification defaults to
//! variation - never lose information.

use std::sync::Arc;

use ah_domain::completion::CompletionRequest;
use ah_domain::error::Result;
use ah_domain::message::Message;
use ah_graph::GraphStore;
use ah_providers::ProviderAdapter;

use crate::ingest::{CreateResult, EpisodeCreator, GOLDEN_STANDARD};

/// Similarity above which the LLM is asked to disambiguate.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Synonyms are capped so one canonical doesn't balloon.
const MAX_SYNONYM_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disambiguation {
    /// Same meaning, different words - merge.
    Rephrase,
    /// Adds nuance or new information - link.
    Variation,
}

/// How a new golden standard was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusteringAction {
    /// No similar golden existed; a new episode was written.
    Created { uuid: String },
    /// Merged into an existing canonical as a synonym; no new episode.
    Merged { canonical_uuid: String },
    /// New episode written and linked to the canonical via REFINES.
    Linked { uuid: String, canonical_uuid: String },
    /// The funnel rejected the content (validation / backend failure).
    Rejected { result: CreateResult },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CanonicalClustering {
    graph: Arc<dyn GraphStore>,
    /// Cheap model for the rephrase/variation call.
    classifier: Arc<dyn ProviderAdapter>,
    classifier_model: Option<String>,
}

struct SimilarGolden {
    uuid: String,
    content: String,
    score: f64,
}

impl CanonicalClustering {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        classifier: Arc<dyn ProviderAdapter>,
        classifier_model: Option<String>,
    ) -> Self {
        Self {
            graph,
            classifier,
            classifier_model,
        }
    }

    /// Ingest a golden standard with canonical clustering.
    pub async fn ingest_golden_standard(
        &self,
        creator: &EpisodeCreator,
        content: &str,
        name: &str,
    ) -> Result<ClusteringAction> {
        match self.find_similar_golden(content, creator.group_id()).await? {
            None => self.create(creator, content, name, None).await,
            Some(similar) => {
                let classification = self
                    .disambiguate(content, &similar.content)
                    .await;
                tracing::info!(
                    canonical = %similar.uuid,
                    score = similar.score,
                    ?classification,
                    "similar golden standard found"
                );

                match classification {
                    Disambiguation::Rephrase => {
                        let mut synonym = content.to_string();
                        synonym.truncate(MAX_SYNONYM_LEN);
                        match self.graph.merge_synonym(&similar.uuid, &synonym).await? {
                            Some(count) => {
                                tracing::info!(
                                    canonical = %similar.uuid,
                                    synonyms = count,
                                    "merged rephrase into canonical"
                                );
                                Ok(ClusteringAction::Merged {
                                    canonical_uuid: similar.uuid,
                                })
                            }
                            // Canonical vanished between search and merge;
                            // store the content rather than dropping it.
                            None => self.create(creator, content, name, None).await,
                        }
                    }
                    Disambiguation::Variation => {
                        self.create(creator, content, name, Some(&similar.uuid)).await
                    }
                }
            }
        }
    }

    async fn create(
        &self,
        creator: &EpisodeCreator,
        content: &str,
        name: &str,
        canonical_uuid: Option<&str>,
    ) -> Result<ClusteringAction> {
        let result = creator
            .create(content, name, GOLDEN_STANDARD, None, None)
            .await?;

        let Some(ref uuid) = result.uuid else {
            return Ok(ClusteringAction::Rejected { result });
        };
        if result.deduplicated {
            // Exact hash duplicate: the funnel already collapsed it.
            return Ok(ClusteringAction::Merged {
                canonical_uuid: uuid.clone(),
            });
        }

        match canonical_uuid {
            Some(canonical) => {
                self.graph.create_refines_edge(uuid, canonical).await?;
                Ok(ClusteringAction::Linked {
                    uuid: uuid.clone(),
                    canonical_uuid: canonical.to_string(),
                })
            }
            None => Ok(ClusteringAction::Created { uuid: uuid.clone() }),
        }
    }

    /// Most similar existing golden standard above the threshold.
    async fn find_similar_golden(
        &self,
        content: &str,
        group_id: &str,
    ) -> Result<Option<SimilarGolden>> {
        let edges = self
            .graph
            .search(
                &format!("golden standard: {content}"),
                &[group_id.to_string()],
                5,
            )
            .await?;

        for edge in edges {
            if !edge.source_description.contains("golden_standard") {
                continue;
            }
            if edge.score >= SIMILARITY_THRESHOLD {
                let uuid = edge
                    .episodes
                    .first()
                    .cloned()
                    .unwrap_or_else(|| edge.uuid.clone());
                return Ok(Some(SimilarGolden {
                    uuid,
                    content: edge.fact,
                    score: edge.score,
                }));
            }
        }
        Ok(None)
    }

    /// Ask the classifier whether the pair is a rephrase or a variation.
    ///
    /// Parsing accepts any substring match of the expected label; failures
    /// default to `Variation`.
    async fn disambiguate(&self, new_content: &str, existing_content: &str) -> Disambiguation {
        let prompt = format!(
            "You are a semantic analyzer for a knowledge base. Compare these two \
             rules and determine their relationship.\n\n\
             EXISTING RULE:\n{existing_content}\n\n\
             NEW RULE:\n{new_content}\n\n\
             Respond with EXACTLY one word:\n\
             - \"rephrase\" if the new rule says the same thing in different words\n\
             - \"variation\" if the new rule adds meaningful new information or nuance\n\n\
             Your response (one word only):"
        );

        let result = self
            .classifier
            .complete(CompletionRequest {
                messages: vec![Message::user(prompt)],
                model: self.classifier_model.clone(),
                max_tokens: Some(10),
                ..Default::default()
            })
            .await;

        match result {
            Ok(response) => parse_disambiguation(&response.content),
            Err(e) => {
                tracing::error!(error = %e, "disambiguation call failed, defaulting to variation");
                Disambiguation::Variation
            }
        }
    }
}

/// Substring-match the classifier output; unknown → variation.
pub fn parse_disambiguation(text: &str) -> Disambiguation {
    let lower = text.trim().to_lowercase();
    if lower.contains("rephrase") {
        Disambiguation::Rephrase
    } else if lower.contains("variation") {
        Disambiguation::Variation
    } else {
        tracing::warn!(response = %text, "unexpected classification, defaulting to variation");
        Disambiguation::Variation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeAdapter;
    use ah_domain::scope::MemoryScope;
    use ah_graph::testing::InMemoryGraph;
    use ah_graph::{EntityEdge, EpisodeNode};
    use chrono::Utc;

    #[test]
    fn parse_accepts_substrings_and_defaults() {
        assert_eq!(parse_disambiguation("Rephrase."), Disambiguation::Rephrase);
        assert_eq!(
            parse_disambiguation("I think this is a variation"),
            Disambiguation::Variation
        );
        assert_eq!(parse_disambiguation("dunno"), Disambiguation::Variation);
        assert_eq!(parse_disambiguation(""), Disambiguation::Variation);
    }

    fn seed_canonical(graph: &InMemoryGraph, uuid: &str, content: &str, score: f64) {
        let mut node = EpisodeNode::new(uuid, "canonical", content, "global");
        node.injection_tier = Some("mandate".into());
        node.source_description =
            "coding_standard mandate source:golden_standard confidence:100".into();
        graph.seed_episode(node);
        graph.set_search_results(vec![EntityEdge {
            uuid: format!("edge-{uuid}"),
            fact: content.into(),
            group_id: "global".into(),
            created_at: Utc::now(),
            score,
            source_description:
                "coding_standard mandate source:golden_standard confidence:100".into(),
            source_node_name: None,
            target_node_name: None,
            episodes: vec![uuid.into()],
            injection_tier: Some("mandate".into()),
        }]);
    }

    #[tokio::test]
    async fn below_threshold_creates_as_is() {
        let graph = Arc::new(InMemoryGraph::new());
        seed_canonical(&graph, "canon-1", "Commit messages use imperative mood.", 0.60);

        let clustering = CanonicalClustering::new(
            graph.clone(),
            Arc::new(FakeAdapter::with_responses(&["rephrase"])),
            None,
        );
        let creator = EpisodeCreator::new(graph.clone(), MemoryScope::Global, None);
        let action = clustering
            .ingest_golden_standard(&creator, "Branch names use kebab-case.", "branch_names")
            .await
            .unwrap();

        assert!(matches!(action, ClusteringAction::Created { .. }));
    }

    #[tokio::test]
    async fn rephrase_merges_without_new_episode() {
        let graph = Arc::new(InMemoryGraph::new());
        seed_canonical(&graph, "canon-1", "Commit messages use imperative mood.", 0.92);
        let before = graph.episode_count();

        let clustering = CanonicalClustering::new(
            graph.clone(),
            Arc::new(FakeAdapter::with_responses(&["rephrase"])),
            None,
        );
        let creator = EpisodeCreator::new(graph.clone(), MemoryScope::Global, None);
        let action = clustering
            .ingest_golden_standard(
                &creator,
                "Write commit messages in the imperative mood.",
                "commit_style",
            )
            .await
            .unwrap();

        assert_eq!(
            action,
            ClusteringAction::Merged {
                canonical_uuid: "canon-1".into()
            }
        );
        assert_eq!(graph.episode_count(), before);
        let canonical = graph.episode("canon-1").unwrap();
        assert_eq!(canonical.synonyms.len(), 1);
        assert!(canonical.ref_count >= 2);
    }

    #[tokio::test]
    async fn variation_creates_and_links() {
        let graph = Arc::new(InMemoryGraph::new());
        seed_canonical(&graph, "canon-1", "Commit messages use imperative mood.", 0.90);

        let clustering = CanonicalClustering::new(
            graph.clone(),
            Arc::new(FakeAdapter::with_responses(&["variation"])),
            None,
        );
        let creator = EpisodeCreator::new(graph.clone(), MemoryScope::Global, None);
        let action = clustering
            .ingest_golden_standard(
                &creator,
                "Commit messages use imperative mood and reference the issue id.",
                "commit_style_issues",
            )
            .await
            .unwrap();

        match action {
            ClusteringAction::Linked {
                uuid,
                canonical_uuid,
            } => {
                assert_eq!(canonical_uuid, "canon-1");
                let edges = graph.refines_edges();
                assert_eq!(edges, vec![(uuid, "canon-1".to_string())]);
            }
            other => panic!("expected Linked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn classifier_gibberish_preserves_information() {
        let graph = Arc::new(InMemoryGraph::new());
        seed_canonical(&graph, "canon-1", "Commit messages use imperative mood.", 0.95);

        let clustering = CanonicalClustering::new(
            graph.clone(),
            Arc::new(FakeAdapter::with_responses(&["as an AI I cannot decide"])),
            None,
        );
        let creator = EpisodeCreator::new(graph.clone(), MemoryScope::Global, None);
        let action = clustering
            .ingest_golden_standard(&creator, "Imperative mood for commits, always.", "c2")
            .await
            .unwrap();

        // Defaulted to variation: a new episode exists.
        assert!(matches!(action, ClusteringAction::Linked { .. }));
    }
}
