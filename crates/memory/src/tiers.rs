//! Tier optimizer - the periodic control loop that moves episodes between
//! tiers based on observed utility.
//!
//! Demotion: harmful ratings, chronic low utility, or zombie status
//! (loaded constantly, cited never). Promotion: helpful ratings or high
//! utility. Pinned episodes are never demoted; fresh episodes sit out a
//! grace period. Every move lands in the tier-change audit log. Runs off
//! the hot path.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use ah_domain::config::TierThresholds;
use ah_domain::error::Result;
use ah_domain::tier::InjectionTier;
use ah_graph::{EpisodeNode, GraphStore};

use crate::audit::{AuditStore, TierChangeRow};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Candidates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// ghost = loaded / (referenced + 1); high means injected-but-never-cited.
pub fn ghost_ratio(loaded: u64, referenced: u64) -> f64 {
    loaded as f64 / (referenced + 1) as f64
}

/// A tier-change candidate with its triggering reason.
#[derive(Debug, Clone)]
pub struct TierCandidate {
    pub uuid: String,
    pub name: String,
    pub current_tier: InjectionTier,
    pub loaded_count: u64,
    pub referenced_count: u64,
    pub utility_score: f64,
    pub ghost_ratio: f64,
    pub age_hours: i64,
    pub reason: String,
}

fn age_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_hours()
}

fn node_tier(node: &EpisodeNode) -> Option<InjectionTier> {
    node.injection_tier.as_deref()?.parse().ok()
}

/// Evaluate one node against the demotion criteria. All candidates must be
/// unpinned and past both the grace period and the minimum age.
fn demotion_reason(node: &EpisodeNode, t: &TierThresholds, now: DateTime<Utc>) -> Option<String> {
    if node.pinned {
        return None;
    }
    let age = age_hours(node.created_at, now);
    if age < t.grace_period_hours || age < t.min_age_days * 24 {
        return None;
    }

    if node.harmful_count >= t.harmful_threshold {
        return Some(format!("harmful_ratings:{}", node.harmful_count));
    }
    if node.loaded_count >= t.min_loads_for_demotion {
        if node.utility_score < t.demotion_utility {
            return Some(format!("low_utility:{:.2}", node.utility_score));
        }
        let ghost = ghost_ratio(node.loaded_count, node.referenced_count);
        if ghost > t.ghost_ratio {
            return Some(format!("zombie:ghost_ratio={ghost:.1}"));
        }
    }
    None
}

/// Evaluate one node against the promotion criteria.
fn promotion_reason(node: &EpisodeNode, t: &TierThresholds, now: DateTime<Utc>) -> Option<String> {
    if age_hours(node.created_at, now) < t.min_age_days * 24 {
        return None;
    }

    if node.helpful_count >= t.helpful_threshold {
        return Some(format!("helpful_ratings:{}", node.helpful_count));
    }
    if node.referenced_count >= t.min_refs_for_promotion
        && node.utility_score > t.promotion_utility
    {
        return Some(format!("high_utility:{:.2}", node.utility_score));
    }
    None
}

fn to_candidate(node: &EpisodeNode, tier: InjectionTier, reason: String, now: DateTime<Utc>) -> TierCandidate {
    TierCandidate {
        uuid: node.uuid.clone(),
        name: node.name.clone(),
        current_tier: tier,
        loaded_count: node.loaded_count,
        referenced_count: node.referenced_count,
        utility_score: node.utility_score,
        ghost_ratio: ghost_ratio(node.loaded_count, node.referenced_count),
        age_hours: age_hours(node.created_at, now),
        reason,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Optimizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Summary of one optimization cycle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OptimizeSummary {
    pub demotions: usize,
    pub promotions: usize,
    pub errors: usize,
}

pub struct TierOptimizer {
    graph: Arc<dyn GraphStore>,
    audit: Option<Arc<AuditStore>>,
    thresholds: TierThresholds,
}

impl TierOptimizer {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        audit: Option<Arc<AuditStore>>,
        thresholds: TierThresholds,
    ) -> Self {
        Self {
            graph,
            audit,
            thresholds,
        }
    }

    /// Demotion candidates across mandate + guardrail tiers.
    pub async fn find_demotion_candidates(
        &self,
        group_ids: &[String],
    ) -> Result<Vec<TierCandidate>> {
        let now = Utc::now();
        let nodes = self
            .graph
            .fetch_episodes_by_tier(group_ids, &["mandate", "guardrail"])
            .await?;
        Ok(nodes
            .iter()
            .filter_map(|n| {
                let tier = node_tier(n)?;
                let reason = demotion_reason(n, &self.thresholds, now)?;
                Some(to_candidate(n, tier, reason, now))
            })
            .collect())
    }

    /// Promotion candidates across guardrail + reference tiers.
    pub async fn find_promotion_candidates(
        &self,
        group_ids: &[String],
    ) -> Result<Vec<TierCandidate>> {
        let now = Utc::now();
        let nodes = self
            .graph
            .fetch_episodes_by_tier(group_ids, &["guardrail", "reference"])
            .await?;
        Ok(nodes
            .iter()
            .filter_map(|n| {
                let tier = node_tier(n)?;
                let reason = promotion_reason(n, &self.thresholds, now)?;
                Some(to_candidate(n, tier, reason, now))
            })
            .collect())
    }

    /// Run one optimization cycle over the given groups.
    pub async fn optimize(&self, group_ids: &[String]) -> Result<OptimizeSummary> {
        let mut summary = OptimizeSummary::default();
        let now = Utc::now();

        for candidate in self.find_demotion_candidates(group_ids).await? {
            let Some(new_tier) = candidate.current_tier.next_lower() else {
                continue;
            };
            match self
                .graph
                .demote_episode(&candidate.uuid, new_tier.as_str(), &candidate.reason, now)
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        uuid = %&candidate.uuid[..candidate.uuid.len().min(8)],
                        to = new_tier.as_str(),
                        reason = %candidate.reason,
                        "demoted episode"
                    );
                    self.log_change(&candidate, new_tier, "demotion");
                    summary.demotions += 1;
                }
                Ok(false) => summary.errors += 1,
                Err(e) => {
                    tracing::error!(error = %e, uuid = %candidate.uuid, "demotion failed");
                    summary.errors += 1;
                }
            }
        }

        for candidate in self.find_promotion_candidates(group_ids).await? {
            let Some(new_tier) = candidate.current_tier.next_higher() else {
                continue;
            };
            match self
                .graph
                .promote_episode(&candidate.uuid, new_tier.as_str(), &candidate.reason, now)
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        uuid = %&candidate.uuid[..candidate.uuid.len().min(8)],
                        to = new_tier.as_str(),
                        reason = %candidate.reason,
                        "promoted episode"
                    );
                    self.log_change(&candidate, new_tier, "promotion");
                    summary.promotions += 1;
                }
                Ok(false) => summary.errors += 1,
                Err(e) => {
                    tracing::error!(error = %e, uuid = %candidate.uuid, "promotion failed");
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            demotions = summary.demotions,
            promotions = summary.promotions,
            errors = summary.errors,
            "tier optimization complete"
        );
        Ok(summary)
    }

    fn log_change(&self, candidate: &TierCandidate, new_tier: InjectionTier, change_type: &str) {
        if let Some(ref audit) = self.audit {
            let row = TierChangeRow {
                episode_uuid: candidate.uuid.clone(),
                old_tier: candidate.current_tier.as_str().into(),
                new_tier: new_tier.as_str().into(),
                reason: candidate.reason.clone(),
                change_type: change_type.into(),
            };
            if let Err(e) = audit.log_tier_change(&row) {
                tracing::error!(error = %e, "failed to log tier change");
            }
        }
    }

    // ── Harmful corrections ──────────────────────────────────────────

    /// Handle an episode with a harmful-rating majority.
    ///
    /// With correction content: create a correction node that REPLACES the
    /// original (original gets `vector_indexed=false`, `has_correction`).
    /// Without: just pull the original out of search.
    pub async fn handle_harmful_episode(
        &self,
        episode_uuid: &str,
        correction_content: Option<&str>,
    ) -> Result<Option<String>> {
        let now = Utc::now();

        match correction_content {
            Some(content) => {
                let correction_uuid = self
                    .graph
                    .create_correction(episode_uuid, content, "harmful_rating_majority", now)
                    .await?;

                if let Some(ref uuid) = correction_uuid {
                    tracing::info!(
                        original = %episode_uuid,
                        correction = %uuid,
                        "created correction node"
                    );
                    if let Some(ref audit) = self.audit {
                        let row = TierChangeRow {
                            episode_uuid: episode_uuid.to_string(),
                            old_tier: "harmful".into(),
                            new_tier: "corrected".into(),
                            reason: format!(
                                "correction_created:{}",
                                &uuid[..uuid.len().min(8)]
                            ),
                            change_type: "correction".into(),
                        };
                        if let Err(e) = audit.log_tier_change(&row) {
                            tracing::error!(error = %e, "failed to log correction");
                        }
                    }
                }
                Ok(correction_uuid)
            }
            None => {
                let mut props = serde_json::Map::new();
                props.insert("vector_indexed".into(), serde_json::json!(false));
                self.graph
                    .set_episode_properties(episode_uuid, props)
                    .await?;
                tracing::info!(uuid = %episode_uuid, "marked harmful episode, removed from search");
                Ok(None)
            }
        }
    }
}
