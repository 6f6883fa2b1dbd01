use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph/vector backend connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "d_graph_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    #[serde(default = "d_3")]
    pub max_retries: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: d_graph_url(),
            api_key: None,
            timeout_ms: 8000,
            max_retries: 3,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget for progressive context injection.
    #[serde(default = "d_budget")]
    pub context_token_budget: usize,
    /// Soft cap on injected mandates.
    #[serde(default = "d_max_mandates")]
    pub max_mandates: usize,
    /// Soft cap on injected guardrails.
    #[serde(default = "d_max_guardrails")]
    pub max_guardrails: usize,
    /// Usage-buffer flush interval. Must stay below 60 to bound data loss.
    #[serde(default = "d_flush_secs")]
    pub flush_interval_secs: u64,
    /// Adaptive index cache TTL.
    #[serde(default = "d_index_ttl")]
    pub index_ttl_secs: u64,
    /// Path to the SQLite audit database. `None` = `~/.agent-hub/audit.db`.
    #[serde(default)]
    pub audit_db_path: Option<String>,
    /// TTL cleanup horizon for stale reference episodes.
    #[serde(default = "d_ttl_days")]
    pub stale_ttl_days: i64,
    #[serde(default)]
    pub tiers: TierThresholds,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_token_budget: d_budget(),
            max_mandates: d_max_mandates(),
            max_guardrails: d_max_guardrails(),
            flush_interval_secs: d_flush_secs(),
            index_ttl_secs: d_index_ttl(),
            audit_db_path: None,
            stale_ttl_days: d_ttl_days(),
            tiers: TierThresholds::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier optimizer thresholds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The configurable constants driving the tier optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierThresholds {
    /// utility_score below this is a demotion signal.
    #[serde(default = "d_demotion_utility")]
    pub demotion_utility: f64,
    /// utility_score above this is a promotion signal.
    #[serde(default = "d_promotion_utility")]
    pub promotion_utility: f64,
    /// Minimum loaded_count before low-utility/zombie demotion applies.
    #[serde(default = "d_min_loads")]
    pub min_loads_for_demotion: u64,
    /// Minimum referenced_count before high-utility promotion applies.
    #[serde(default = "d_min_refs")]
    pub min_refs_for_promotion: u64,
    /// Minimum age before any tier change.
    #[serde(default = "d_min_age_days")]
    pub min_age_days: i64,
    /// New episodes are exempt from demotion for this long.
    #[serde(default = "d_grace_hours")]
    pub grace_period_hours: i64,
    /// loaded/(referenced+1) above this marks a zombie.
    #[serde(default = "d_ghost_ratio")]
    pub ghost_ratio: f64,
    /// harmful_count at or above this forces demotion.
    #[serde(default = "d_harmful")]
    pub harmful_threshold: u64,
    /// helpful_count at or above this forces promotion.
    #[serde(default = "d_helpful")]
    pub helpful_threshold: u64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            demotion_utility: d_demotion_utility(),
            promotion_utility: d_promotion_utility(),
            min_loads_for_demotion: d_min_loads(),
            min_refs_for_promotion: d_min_refs(),
            min_age_days: d_min_age_days(),
            grace_period_hours: d_grace_hours(),
            ghost_ratio: d_ghost_ratio(),
            harmful_threshold: d_harmful(),
            helpful_threshold: d_helpful(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_graph_url() -> String {
    "http://localhost:8600".into()
}
fn d_8000() -> u64 {
    8000
}
fn d_3() -> u32 {
    3
}
fn d_budget() -> usize {
    3000
}
fn d_max_mandates() -> usize {
    10
}
fn d_max_guardrails() -> usize {
    8
}
fn d_flush_secs() -> u64 {
    30
}
fn d_index_ttl() -> u64 {
    300
}
fn d_ttl_days() -> i64 {
    30
}
fn d_demotion_utility() -> f64 {
    0.15
}
fn d_promotion_utility() -> f64 {
    0.70
}
fn d_min_loads() -> u64 {
    50
}
fn d_min_refs() -> u64 {
    20
}
fn d_min_age_days() -> i64 {
    7
}
fn d_grace_hours() -> i64 {
    48
}
fn d_ghost_ratio() -> f64 {
    10.0
}
fn d_harmful() -> u64 {
    3
}
fn d_helpful() -> u64 {
    3
}
