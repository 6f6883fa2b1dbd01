//! Score-based memory selection.
//!
//! All candidates compete on `final_score`: items above the variant's
//! threshold are included, sorted descending. A high-scoring guardrail may
//! outrank a low-scoring mandate - tier multipliers bias scoring, they do
//! not hard-gate.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use ah_domain::tier::InjectionTier;

use crate::scoring::{golden_standard_passes_gate, score_memory, MemoryScore, ScoreInput};
use crate::service::MemorySearchResult;
use crate::variants::VariantConfig;

/// A memory item with its computed score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: MemorySearchResult,
    pub score: MemoryScore,
}

/// Selection accounting, surfaced in the injector's debug info.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SelectionDebug {
    pub total_scored: usize,
    pub selected_count: usize,
    pub excluded_count: usize,
    pub golden_gate_excluded: usize,
    pub threshold: f64,
    pub mandates_selected: usize,
    pub guardrails_selected: usize,
    pub reference_selected: usize,
}

fn score_result(
    result: &MemorySearchResult,
    config: &VariantConfig,
    tag_matches: &HashSet<String>,
    now: DateTime<Utc>,
) -> MemoryScore {
    let input = ScoreInput {
        semantic_similarity: result.similarity,
        confidence: result.confidence,
        loaded_count: result.loaded_count,
        referenced_count: result.referenced_count,
        created_at: result.created_at,
        last_used_at: result.last_used_at,
        tier: result.tier,
        has_tag_match: tag_matches.contains(&result.uuid),
    };
    score_memory(&input, config, now)
}

/// Select memories across all three tiers.
///
/// Mandates additionally pass the golden-standard similarity gate (pinned
/// mandates skip it - they are injected regardless downstream). Returns the
/// selected items sorted strictly descending by score.
pub fn select_memories(
    mandates: Vec<MemorySearchResult>,
    guardrails: Vec<MemorySearchResult>,
    references: Vec<MemorySearchResult>,
    config: &VariantConfig,
    tag_matches: &HashSet<String>,
    now: DateTime<Utc>,
) -> (Vec<ScoredMemory>, SelectionDebug) {
    let mut scored: Vec<ScoredMemory> = Vec::new();
    let mut golden_gate_excluded = 0usize;
    let mut total = 0usize;

    for m in mandates {
        total += 1;
        if !m.pinned && !golden_standard_passes_gate(m.similarity, config) {
            golden_gate_excluded += 1;
            continue;
        }
        let score = score_result(&m, config, tag_matches, now);
        scored.push(ScoredMemory { memory: m, score });
    }
    for g in guardrails {
        total += 1;
        let score = score_result(&g, config, tag_matches, now);
        scored.push(ScoredMemory { memory: g, score });
    }
    for r in references {
        total += 1;
        let score = score_result(&r, config, tag_matches, now);
        scored.push(ScoredMemory { memory: r, score });
    }

    scored.sort_by(|a, b| {
        b.score
            .final_score
            .partial_cmp(&a.score.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let selected: Vec<ScoredMemory> = scored
        .into_iter()
        .filter(|s| s.score.passes_threshold || s.memory.pinned)
        .collect();

    let count_tier = |tier: InjectionTier| selected.iter().filter(|s| s.memory.tier == tier).count();
    let selection_debug = SelectionDebug {
        total_scored: total,
        selected_count: selected.len(),
        excluded_count: total - selected.len(),
        golden_gate_excluded,
        threshold: config.min_relevance_threshold,
        mandates_selected: count_tier(InjectionTier::Mandate),
        guardrails_selected: count_tier(InjectionTier::Guardrail),
        reference_selected: count_tier(InjectionTier::Reference),
    };

    tracing::debug!(
        selected = selection_debug.selected_count,
        scored = selection_debug.total_scored,
        threshold = selection_debug.threshold,
        "memory selection"
    );

    (selected, selection_debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::BASELINE_CONFIG;

    fn candidate(uuid: &str, tier: InjectionTier, similarity: f64) -> MemorySearchResult {
        MemorySearchResult {
            uuid: uuid.into(),
            content: format!("content for {uuid}"),
            similarity,
            tier,
            confidence: 80.0,
            loaded_count: 10,
            referenced_count: 5,
            created_at: Some(Utc::now()),
            last_used_at: None,
            pinned: false,
            trigger_task_types: Vec::new(),
            source_description: String::new(),
        }
    }

    #[test]
    fn returned_items_all_pass_threshold_sorted_descending() {
        let mandates = vec![candidate("m1", InjectionTier::Mandate, 0.9)];
        let guardrails = vec![candidate("g1", InjectionTier::Guardrail, 0.7)];
        let references = vec![
            candidate("r1", InjectionTier::Reference, 0.8),
            candidate("r2", InjectionTier::Reference, 0.01),
        ];

        let (selected, debug) = select_memories(
            mandates,
            guardrails,
            references,
            &BASELINE_CONFIG,
            &HashSet::new(),
            Utc::now(),
        );

        for s in &selected {
            assert!(s.score.final_score >= BASELINE_CONFIG.min_relevance_threshold);
        }
        for pair in selected.windows(2) {
            assert!(pair[0].score.final_score >= pair[1].score.final_score);
        }
        assert_eq!(debug.total_scored, 4);
    }

    #[test]
    fn strong_guardrail_outranks_weak_mandate() {
        // Decision d6: tier multipliers bias, they don't hard-gate.
        let mut weak_mandate = candidate("m1", InjectionTier::Mandate, 0.26);
        weak_mandate.confidence = 30.0;
        weak_mandate.loaded_count = 50;
        weak_mandate.referenced_count = 0;
        weak_mandate.created_at = Some(Utc::now() - chrono::Duration::days(120));

        let mut strong_guardrail = candidate("g1", InjectionTier::Guardrail, 0.95);
        strong_guardrail.confidence = 95.0;
        strong_guardrail.loaded_count = 20;
        strong_guardrail.referenced_count = 20;

        let (selected, _) = select_memories(
            vec![weak_mandate],
            vec![strong_guardrail],
            vec![],
            &BASELINE_CONFIG,
            &HashSet::new(),
            Utc::now(),
        );

        assert!(!selected.is_empty());
        assert_eq!(selected[0].memory.uuid, "g1");
    }

    #[test]
    fn golden_gate_excludes_low_similarity_mandates() {
        let mandates = vec![
            candidate("far", InjectionTier::Mandate, 0.1),
            candidate("near", InjectionTier::Mandate, 0.6),
        ];
        let (selected, debug) = select_memories(
            mandates,
            vec![],
            vec![],
            &BASELINE_CONFIG,
            &HashSet::new(),
            Utc::now(),
        );
        assert_eq!(debug.golden_gate_excluded, 1);
        assert!(selected.iter().all(|s| s.memory.uuid != "far"));
    }

    #[test]
    fn pinned_mandate_skips_golden_gate() {
        let mut pinned = candidate("pinned", InjectionTier::Mandate, 0.05);
        pinned.pinned = true;
        let (selected, _) = select_memories(
            vec![pinned],
            vec![],
            vec![],
            &BASELINE_CONFIG,
            &HashSet::new(),
            Utc::now(),
        );
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn tag_match_boosts_selection() {
        let mut tags = HashSet::new();
        tags.insert("r1".to_string());
        let references = vec![candidate("r1", InjectionTier::Reference, 0.5)];
        let (with_boost, _) = select_memories(
            vec![],
            vec![],
            references.clone(),
            &BASELINE_CONFIG,
            &tags,
            Utc::now(),
        );
        let (without_boost, _) = select_memories(
            vec![],
            vec![],
            references,
            &BASELINE_CONFIG,
            &HashSet::new(),
            Utc::now(),
        );
        assert!(
            with_boost[0].score.final_score > without_boost[0].score.final_score
        );
    }
}
