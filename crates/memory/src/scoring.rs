//! Multi-factor scoring for context injection.
//!
//! `final = (w_sem·semantic + w_use·usage + w_conf·confidence + w_rec·recency)
//!          · tier_multiplier · tag_boost`
//!
//! Weights come from the active variant config. The score decides which
//! memories are injected; tier multipliers bias, they do not hard-gate.

use chrono::{DateTime, Utc};

use ah_domain::tier::InjectionTier;

use crate::variants::VariantConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs / outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input data for scoring one memory item.
#[derive(Debug, Clone)]
pub struct ScoreInput {
    /// 0.0–1.0, from vector search.
    pub semantic_similarity: f64,
    /// 0.0–100.0.
    pub confidence: f64,
    /// Times injected into context.
    pub loaded_count: u64,
    /// Times cited by the LLM.
    pub referenced_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub tier: InjectionTier,
    /// Whether the item matches the agent's task-type tags.
    pub has_tag_match: bool,
}

impl Default for ScoreInput {
    fn default() -> Self {
        Self {
            semantic_similarity: 0.0,
            confidence: 50.0,
            loaded_count: 0,
            referenced_count: 0,
            created_at: None,
            last_used_at: None,
            tier: InjectionTier::Reference,
            has_tag_match: false,
        }
    }
}

/// Result of scoring one memory item.
#[derive(Debug, Clone)]
pub struct MemoryScore {
    pub final_score: f64,
    pub semantic_component: f64,
    pub usage_component: f64,
    pub confidence_component: f64,
    pub recency_component: f64,
    pub tier_multiplier: f64,
    pub tag_boost: f64,
    pub passes_threshold: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Components
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Usage effectiveness: how often a memory is cited when injected.
/// Never-loaded items get a neutral 0.5 prior.
pub fn usage_effectiveness(loaded_count: u64, referenced_count: u64) -> f64 {
    if loaded_count == 0 {
        return 0.5;
    }
    (referenced_count as f64 / loaded_count as f64).min(1.0)
}

/// Exponential recency decay: `0.5^(age_days / half_life)`.
///
/// The reference point is the more recent of `last_used_at` / `created_at`;
/// no timestamp at all yields a neutral 0.5.
pub fn recency_decay(
    created_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    half_life_days: f64,
    now: DateTime<Utc>,
) -> f64 {
    let reference = match (created_at, last_used_at) {
        (Some(c), Some(u)) => Some(c.max(u)),
        (Some(c), None) => Some(c),
        (None, Some(u)) => Some(u),
        (None, None) => None,
    };
    let Some(reference) = reference else {
        return 0.5;
    };

    let age_days = (now - reference).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    clamp01(0.5_f64.powf(age_days / half_life_days))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scoring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Score a memory item with the active variant's weights and multipliers.
pub fn score_memory(input: &ScoreInput, config: &VariantConfig, now: DateTime<Utc>) -> MemoryScore {
    let weights = &config.scoring_weights;
    let tiers = &config.tier_multipliers;

    let semantic = clamp01(input.semantic_similarity);
    let usage = usage_effectiveness(input.loaded_count, input.referenced_count);
    let confidence = clamp01(input.confidence / 100.0);

    let half_life = match input.tier {
        InjectionTier::Mandate => config.recency.mandate_half_life_days,
        _ => config.recency.reference_half_life_days,
    };
    let recency = recency_decay(input.created_at, input.last_used_at, half_life, now);

    let base = semantic * weights.semantic
        + usage * weights.usage
        + confidence * weights.confidence
        + recency * weights.recency;

    let tier_multiplier = match input.tier {
        InjectionTier::Mandate => tiers.mandate,
        InjectionTier::Guardrail => tiers.guardrail,
        InjectionTier::Reference => tiers.reference,
    };
    let tag_boost = if input.has_tag_match {
        tiers.agent_tag_boost
    } else {
        1.0
    };

    let final_score = base * tier_multiplier * tag_boost;

    MemoryScore {
        final_score,
        semantic_component: semantic,
        usage_component: usage,
        confidence_component: confidence,
        recency_component: recency,
        tier_multiplier,
        tag_boost,
        passes_threshold: final_score >= config.min_relevance_threshold,
    }
}

/// Whether a golden standard clears its semantic-relevance gate.
///
/// Confidence=100 is a multiplier, not automatic inclusion: a mandate below
/// `golden_standard_min_similarity` is excluded no matter its confidence.
pub fn golden_standard_passes_gate(semantic_similarity: f64, config: &VariantConfig) -> bool {
    semantic_similarity >= config.golden_standard_min_similarity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::BASELINE_CONFIG;
    use chrono::Duration;

    fn input() -> ScoreInput {
        ScoreInput {
            semantic_similarity: 0.6,
            confidence: 80.0,
            loaded_count: 10,
            referenced_count: 5,
            created_at: Some(Utc::now() - Duration::days(2)),
            last_used_at: Some(Utc::now() - Duration::days(1)),
            tier: InjectionTier::Reference,
            has_tag_match: false,
        }
    }

    #[test]
    fn semantic_is_monotonic() {
        let now = Utc::now();
        let mut lo = input();
        lo.semantic_similarity = 0.3;
        let mut hi = input();
        hi.semantic_similarity = 0.8;
        assert!(
            score_memory(&hi, &BASELINE_CONFIG, now).final_score
                > score_memory(&lo, &BASELINE_CONFIG, now).final_score
        );
    }

    #[test]
    fn confidence_is_monotonic() {
        let now = Utc::now();
        let mut lo = input();
        lo.confidence = 40.0;
        let mut hi = input();
        hi.confidence = 95.0;
        assert!(
            score_memory(&hi, &BASELINE_CONFIG, now).final_score
                > score_memory(&lo, &BASELINE_CONFIG, now).final_score
        );
    }

    #[test]
    fn referenced_count_is_monotonic_at_fixed_loads() {
        let now = Utc::now();
        let mut lo = input();
        lo.loaded_count = 20;
        lo.referenced_count = 2;
        let mut hi = input();
        hi.loaded_count = 20;
        hi.referenced_count = 15;
        assert!(
            score_memory(&hi, &BASELINE_CONFIG, now).final_score
                > score_memory(&lo, &BASELINE_CONFIG, now).final_score
        );
    }

    #[test]
    fn age_decreases_recency() {
        let now = Utc::now();
        let fresh = recency_decay(Some(now - Duration::days(1)), None, 7.0, now);
        let stale = recency_decay(Some(now - Duration::days(30)), None, 7.0, now);
        assert!(fresh > stale);
    }

    #[test]
    fn recency_uses_later_of_created_and_used() {
        let now = Utc::now();
        let with_recent_use = recency_decay(
            Some(now - Duration::days(60)),
            Some(now - Duration::days(1)),
            7.0,
            now,
        );
        let without_use = recency_decay(Some(now - Duration::days(60)), None, 7.0, now);
        assert!(with_recent_use > without_use);
    }

    #[test]
    fn never_loaded_gets_neutral_usage_prior() {
        assert_eq!(usage_effectiveness(0, 0), 0.5);
        assert_eq!(usage_effectiveness(0, 10), 0.5);
    }

    #[test]
    fn usage_caps_at_one() {
        assert_eq!(usage_effectiveness(5, 50), 1.0);
    }

    #[test]
    fn no_timestamps_neutral_recency() {
        assert_eq!(recency_decay(None, None, 7.0, Utc::now()), 0.5);
    }

    #[test]
    fn half_life_decays_to_half() {
        let now = Utc::now();
        let v = recency_decay(Some(now - Duration::days(7)), None, 7.0, now);
        assert!((v - 0.5).abs() < 0.01);
    }

    #[test]
    fn golden_gate_ignores_confidence() {
        assert!(!golden_standard_passes_gate(0.1, &BASELINE_CONFIG));
        assert!(golden_standard_passes_gate(0.3, &BASELINE_CONFIG));
    }

    #[test]
    fn mandate_multiplier_applied() {
        let now = Utc::now();
        let mut reference = input();
        reference.tier = InjectionTier::Reference;
        let mut mandate = input();
        mandate.tier = InjectionTier::Mandate;

        let r = score_memory(&reference, &BASELINE_CONFIG, now);
        let m = score_memory(&mandate, &BASELINE_CONFIG, now);
        assert_eq!(r.tier_multiplier, 1.0);
        assert_eq!(m.tier_multiplier, 2.0);
        assert!(m.final_score > r.final_score);
    }

    #[test]
    fn tag_boost_applied() {
        let now = Utc::now();
        let mut tagged = input();
        tagged.has_tag_match = true;
        let plain = input();
        let t = score_memory(&tagged, &BASELINE_CONFIG, now);
        let p = score_memory(&plain, &BASELINE_CONFIG, now);
        assert!(t.final_score > p.final_score);
        assert_eq!(t.tag_boost, 1.2);
    }
}
