//! A/B variant system for context-injection tuning.
//!
//! A variant bundles scoring weights, tier multipliers, recency half-lives,
//! and thresholds. Assignment is deterministic per (external_id,
//! project_id): the same inputs map to the same variant forever, across
//! process restarts.

use sha2::{Digest, Sha256};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Variants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryVariant {
    /// Production behavior: standard weights, moderate thresholds.
    Baseline,
    /// Higher semantic weight, stricter quality.
    Enhanced,
    /// Very strict filtering, fewer items injected.
    Minimal,
    /// Lower thresholds, more items injected.
    Aggressive,
}

impl MemoryVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryVariant::Baseline => "BASELINE",
            MemoryVariant::Enhanced => "ENHANCED",
            MemoryVariant::Minimal => "MINIMAL",
            MemoryVariant::Aggressive => "AGGRESSIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BASELINE" => Some(MemoryVariant::Baseline),
            "ENHANCED" => Some(MemoryVariant::Enhanced),
            "MINIMAL" => Some(MemoryVariant::Minimal),
            "AGGRESSIVE" => Some(MemoryVariant::Aggressive),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Variant configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Weight distribution for multi-factor scoring. Weights sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub semantic: f64,
    pub usage: f64,
    pub confidence: f64,
    pub recency: f64,
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.semantic + self.usage + self.confidence + self.recency
    }
}

/// Score multipliers per tier.
#[derive(Debug, Clone, Copy)]
pub struct TierMultipliers {
    pub mandate: f64,
    pub guardrail: f64,
    pub reference: f64,
    /// Boost applied when an episode matches the agent's task-type tags.
    pub agent_tag_boost: f64,
}

/// Recency decay half-lives, per tier family.
#[derive(Debug, Clone, Copy)]
pub struct RecencyConfig {
    pub mandate_half_life_days: f64,
    pub reference_half_life_days: f64,
}

/// Configuration for one injection variant.
#[derive(Debug, Clone, Copy)]
pub struct VariantConfig {
    pub variant: MemoryVariant,
    pub scoring_weights: ScoringWeights,
    pub tier_multipliers: TierMultipliers,
    pub recency: RecencyConfig,
    /// Minimum final score for inclusion.
    pub min_relevance_threshold: f64,
    /// Minimum semantic similarity for golden standards - confidence=100
    /// multiplies, it does not bypass this gate.
    pub golden_standard_min_similarity: f64,
}

pub const BASELINE_CONFIG: VariantConfig = VariantConfig {
    variant: MemoryVariant::Baseline,
    scoring_weights: ScoringWeights {
        semantic: 0.4,
        usage: 0.3,
        confidence: 0.2,
        recency: 0.1,
    },
    tier_multipliers: TierMultipliers {
        mandate: 2.0,
        guardrail: 1.5,
        reference: 1.0,
        agent_tag_boost: 1.2,
    },
    recency: RecencyConfig {
        mandate_half_life_days: 30.0,
        reference_half_life_days: 7.0,
    },
    min_relevance_threshold: 0.35,
    golden_standard_min_similarity: 0.25,
};

pub const ENHANCED_CONFIG: VariantConfig = VariantConfig {
    variant: MemoryVariant::Enhanced,
    scoring_weights: ScoringWeights {
        semantic: 0.5,
        usage: 0.25,
        confidence: 0.15,
        recency: 0.1,
    },
    tier_multipliers: TierMultipliers {
        mandate: 2.5,
        guardrail: 1.8,
        reference: 1.0,
        agent_tag_boost: 1.2,
    },
    recency: RecencyConfig {
        mandate_half_life_days: 45.0,
        reference_half_life_days: 14.0,
    },
    min_relevance_threshold: 0.40,
    golden_standard_min_similarity: 0.30,
};

pub const MINIMAL_CONFIG: VariantConfig = VariantConfig {
    variant: MemoryVariant::Minimal,
    scoring_weights: ScoringWeights {
        semantic: 0.6,
        usage: 0.2,
        confidence: 0.15,
        recency: 0.05,
    },
    tier_multipliers: TierMultipliers {
        mandate: 3.0,
        guardrail: 2.0,
        reference: 1.0,
        agent_tag_boost: 1.2,
    },
    recency: RecencyConfig {
        mandate_half_life_days: 60.0,
        reference_half_life_days: 21.0,
    },
    min_relevance_threshold: 0.50,
    golden_standard_min_similarity: 0.35,
};

pub const AGGRESSIVE_CONFIG: VariantConfig = VariantConfig {
    variant: MemoryVariant::Aggressive,
    scoring_weights: ScoringWeights {
        semantic: 0.35,
        usage: 0.35,
        confidence: 0.20,
        recency: 0.10,
    },
    tier_multipliers: TierMultipliers {
        mandate: 1.5,
        guardrail: 1.3,
        reference: 1.0,
        agent_tag_boost: 1.2,
    },
    recency: RecencyConfig {
        mandate_half_life_days: 20.0,
        reference_half_life_days: 5.0,
    },
    min_relevance_threshold: 0.25,
    golden_standard_min_similarity: 0.20,
};

/// Config for a variant.
pub fn get_variant_config(variant: MemoryVariant) -> VariantConfig {
    match variant {
        MemoryVariant::Baseline => BASELINE_CONFIG,
        MemoryVariant::Enhanced => ENHANCED_CONFIG,
        MemoryVariant::Minimal => MINIMAL_CONFIG,
        MemoryVariant::Aggressive => AGGRESSIVE_CONFIG,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assignment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cumulative bucket distribution: 50% BASELINE, 30% ENHANCED, 10% MINIMAL,
/// 10% AGGRESSIVE.
const VARIANT_BUCKETS: &[(u8, MemoryVariant)] = &[
    (50, MemoryVariant::Baseline),
    (80, MemoryVariant::Enhanced),
    (90, MemoryVariant::Minimal),
    (100, MemoryVariant::Aggressive),
];

/// Deterministically assign a variant from hashed identifiers.
///
/// An explicit override short-circuits the hash (unknown override names fall
/// back to BASELINE). No identifiers at all also means BASELINE.
pub fn assign_variant(
    external_id: Option<&str>,
    project_id: Option<&str>,
    variant_override: Option<&str>,
) -> MemoryVariant {
    if let Some(name) = variant_override {
        return MemoryVariant::parse(name).unwrap_or_else(|| {
            tracing::warn!(name, "invalid variant override, falling back to BASELINE");
            MemoryVariant::Baseline
        });
    }

    let hash_input = format!(
        "{}:{}",
        external_id.unwrap_or_default(),
        project_id.unwrap_or_default()
    );
    if hash_input == ":" {
        return MemoryVariant::Baseline;
    }

    let digest = Sha256::digest(hash_input.as_bytes());
    let bucket = digest[0] % 100;

    for &(cumulative, variant) in VARIANT_BUCKETS {
        if bucket < cumulative {
            tracing::debug!(variant = variant.as_str(), bucket, "assigned variant");
            return variant;
        }
    }
    MemoryVariant::Baseline
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn weights_sum_to_one_for_all_presets() {
        for cfg in [
            BASELINE_CONFIG,
            ENHANCED_CONFIG,
            MINIMAL_CONFIG,
            AGGRESSIVE_CONFIG,
        ] {
            assert!(
                (cfg.scoring_weights.sum() - 1.0).abs() < 0.001,
                "{:?} weights sum to {}",
                cfg.variant,
                cfg.scoring_weights.sum()
            );
        }
    }

    #[test]
    fn assignment_is_deterministic() {
        let a = assign_variant(Some("task-42"), Some("proj-X"), None);
        for _ in 0..100 {
            assert_eq!(a, assign_variant(Some("task-42"), Some("proj-X"), None));
        }
    }

    #[test]
    fn override_short_circuits() {
        assert_eq!(
            assign_variant(Some("task-42"), Some("proj-X"), Some("AGGRESSIVE")),
            MemoryVariant::Aggressive
        );
        assert_eq!(
            assign_variant(None, None, Some("enhanced")),
            MemoryVariant::Enhanced
        );
    }

    #[test]
    fn invalid_override_falls_back_to_baseline() {
        assert_eq!(
            assign_variant(Some("x"), None, Some("TURBO")),
            MemoryVariant::Baseline
        );
    }

    #[test]
    fn no_identifiers_means_baseline() {
        assert_eq!(assign_variant(None, None, None), MemoryVariant::Baseline);
    }

    #[test]
    fn distribution_tracks_declared_buckets() {
        let mut counts: HashMap<MemoryVariant, usize> = HashMap::new();
        let n = 20_000;
        for i in 0..n {
            let id = format!("ext-{i}");
            let v = assign_variant(Some(&id), Some("proj"), None);
            *counts.entry(v).or_default() += 1;
        }
        let pct = |v: MemoryVariant| {
            100.0 * *counts.get(&v).unwrap_or(&0) as f64 / n as f64
        };
        assert!((pct(MemoryVariant::Baseline) - 50.0).abs() < 3.0);
        assert!((pct(MemoryVariant::Enhanced) - 30.0).abs() < 3.0);
        assert!((pct(MemoryVariant::Minimal) - 10.0).abs() < 3.0);
        assert!((pct(MemoryVariant::Aggressive) - 10.0).abs() < 3.0);
    }
}
