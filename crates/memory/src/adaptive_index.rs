//! Self-optimizing adaptive index of mandates.
//!
//! A compact catalog of every mandate - one-line summary, 8-char citation
//! id, category - always injected so the model knows which rules exist
//! without their full content. Entries learn a relevance ratio
//! (referenced/loaded); entries that stay statistically useless get
//! demoted out of the injected text. The demotion threshold emerges from
//! the data (`max(0, median − stdev)` over entries with enough samples),
//! it is never hardcoded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use ah_domain::error::Result;
use ah_graph::GraphStore;

use crate::citations::{format_citation, CitationType};

/// Minimum loads before an entry may be demoted.
pub const MIN_SAMPLES_FOR_DEMOTION: u64 = 10;

/// Fewer eligible entries than this and no statistics are computed.
const MIN_ENTRIES_FOR_STATISTICS: usize = 3;

/// Utility-score delta that invalidates the cache.
pub const SIGNIFICANT_UTILITY_DELTA: f64 = 0.1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single entry in the adaptive index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub uuid: String,
    /// First 8 chars, for `[M:xxxxxxxx]` citations.
    pub short_id: String,
    pub summary: String,
    pub category: String,
    /// referenced/loaded; 0.5 default for untracked entries.
    pub relevance_ratio: f64,
    pub loaded_count: u64,
    pub referenced_count: u64,
    pub is_demoted: bool,
}

/// The built index plus its bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveIndex {
    pub entries: Vec<IndexEntry>,
    pub built_at: Option<DateTime<Utc>>,
    pub demotion_threshold: Option<f64>,
}

impl AdaptiveIndex {
    pub fn active_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().filter(|e| !e.is_demoted)
    }

    /// Render the index for injection, grouped by category.
    ///
    /// ```text
    /// ## Adaptive Index
    /// **Testing**: AAA pattern [M:abc12345], realistic data [M:def67890]
    /// ```
    pub fn format_for_injection(&self) -> String {
        let mut by_category: BTreeMap<&str, Vec<&IndexEntry>> = BTreeMap::new();
        for entry in self.active_entries() {
            by_category.entry(&entry.category).or_default().push(entry);
        }
        if by_category.is_empty() {
            return String::new();
        }

        let mut lines = vec!["## Adaptive Index".to_string()];
        for (category, entries) in by_category {
            let items: Vec<String> = entries
                .iter()
                .map(|e| {
                    format!(
                        "{} {}",
                        e.summary,
                        format_citation(&e.uuid, CitationType::Mandate)
                    )
                })
                .collect();
            lines.push(format!("**{category}**: {}", items.join(", ")));
        }
        lines.join("\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Statistics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    var.sqrt()
}

/// Compute the demotion threshold: `max(0, median − stdev)` over entries
/// meeting the sample floor. `None` when the data is too thin.
pub fn calculate_demotion_threshold(entries: &[IndexEntry]) -> Option<f64> {
    let mut ratios: Vec<f64> = entries
        .iter()
        .filter(|e| e.loaded_count >= MIN_SAMPLES_FOR_DEMOTION)
        .map(|e| e.relevance_ratio)
        .collect();

    if ratios.len() < MIN_ENTRIES_FOR_STATISTICS {
        return None;
    }
    ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Some((median(&ratios) - stdev(&ratios)).max(0.0))
}

/// Mark entries demoted: below threshold AND enough samples. Entries under
/// the sample floor are never demoted.
pub fn apply_demotion(entries: &mut [IndexEntry], threshold: Option<f64>) {
    let Some(threshold) = threshold else {
        return;
    };
    for entry in entries.iter_mut() {
        entry.is_demoted = entry.loaded_count >= MIN_SAMPLES_FOR_DEMOTION
            && entry.relevance_ratio < threshold;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content heuristics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyword-bucket a mandate into a display category.
pub fn categorize_content(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    let any = |kws: &[&str]| kws.iter().any(|k| lower.contains(k));

    if any(&["test", "mock", "fixture", "assert"]) {
        "Testing"
    } else if any(&["git", "commit", "push", "branch", "merge"]) {
        "Git"
    } else if any(&["error", "exception", "fail", "bug", "panic"]) {
        "Errors"
    } else if any(&["cli", "command", "terminal", "shell", "bash"]) {
        "CLI"
    } else if any(&["async", "await", "function", "struct", "trait"]) {
        "Coding"
    } else if any(&["architect", "design", "pattern", "system"]) {
        "Architecture"
    } else {
        "General"
    }
}

/// One-liner summary: first sentence if it fits, else word-boundary
/// truncation with an ellipsis.
pub fn summarize_content(content: &str, max_length: usize) -> String {
    let flat = content.replace('\n', " ").trim().to_string();

    for delim in ['.', '!', '?'] {
        if let Some(pos) = flat.find(delim) {
            let first = flat[..pos].trim();
            if first.len() <= max_length {
                return first.to_string();
            }
            break;
        }
    }

    if flat.len() > max_length {
        let cut = &flat[..max_length.saturating_sub(3)];
        let trimmed = cut.rsplit_once(' ').map(|(head, _)| head).unwrap_or(cut);
        return format!("{trimmed}...");
    }
    flat
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cached service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// TTL-cached adaptive index over the graph's mandates.
pub struct AdaptiveIndexService {
    graph: Arc<dyn GraphStore>,
    ttl: Duration,
    cache: Mutex<Option<AdaptiveIndex>>,
}

impl AdaptiveIndexService {
    pub fn new(graph: Arc<dyn GraphStore>, ttl_secs: u64) -> Self {
        Self {
            graph,
            ttl: Duration::from_secs(ttl_secs),
            cache: Mutex::new(None),
        }
    }

    /// Current index, rebuilt when stale or absent. On a backend error a
    /// stale cache is served rather than nothing.
    pub async fn get(&self, group_id: &str) -> Result<AdaptiveIndex> {
        {
            let cache = self.cache.lock();
            if let Some(ref index) = *cache {
                let fresh = index
                    .built_at
                    .map(|t| (Utc::now() - t).to_std().unwrap_or_default() < self.ttl)
                    .unwrap_or(false);
                if fresh {
                    return Ok(index.clone());
                }
            }
        }

        match self.build(group_id).await {
            Ok(index) => {
                *self.cache.lock() = Some(index.clone());
                Ok(index)
            }
            Err(e) => {
                let cache = self.cache.lock();
                if let Some(ref stale) = *cache {
                    tracing::warn!(error = %e, "index rebuild failed, serving stale cache");
                    return Ok(stale.clone());
                }
                Err(e)
            }
        }
    }

    async fn build(&self, group_id: &str) -> Result<AdaptiveIndex> {
        let mandates = self
            .graph
            .fetch_episodes_by_tier(&[group_id.to_string()], &["mandate"])
            .await?;

        let mut entries: Vec<IndexEntry> = mandates
            .iter()
            .filter(|m| !m.uuid.is_empty() && !m.content.is_empty())
            .map(|m| {
                let ratio = if m.loaded_count > 0 {
                    m.referenced_count as f64 / m.loaded_count as f64
                } else {
                    0.5
                };
                IndexEntry {
                    uuid: m.uuid.clone(),
                    short_id: m.uuid.chars().take(8).collect(),
                    summary: m
                        .summary
                        .clone()
                        .unwrap_or_else(|| summarize_content(&m.content, 60)),
                    category: categorize_content(&m.content).to_string(),
                    relevance_ratio: ratio,
                    loaded_count: m.loaded_count,
                    referenced_count: m.referenced_count,
                    is_demoted: false,
                }
            })
            .collect();

        let threshold = calculate_demotion_threshold(&entries);
        apply_demotion(&mut entries, threshold);

        let index = AdaptiveIndex {
            built_at: Some(Utc::now()),
            demotion_threshold: threshold,
            entries,
        };
        tracing::info!(
            entries = index.entries.len(),
            active = index.active_entries().count(),
            threshold = threshold.unwrap_or(0.0),
            "built adaptive index"
        );
        Ok(index)
    }

    /// Drop the cache; next access rebuilds.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
        tracing::debug!("adaptive index cache invalidated");
    }

    /// Invalidate when any mandate's utility moved by a significant delta.
    pub fn refresh_if_significant(&self, utility_deltas: &[f64]) -> bool {
        if utility_deltas
            .iter()
            .any(|d| d.abs() >= SIGNIFICANT_UTILITY_DELTA)
        {
            self.invalidate();
            return true;
        }
        false
    }
}
