//! The [`GraphStore`] trait - every graph read/write the core performs.
//!
//! The memory engine never composes raw queries itself; each operation it
//! needs is a typed method here. The REST implementation translates methods
//! into graph-service calls (including raw query execution for counter math
//! and maintenance); the in-memory double implements them over maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use ah_domain::error::Result;

use crate::types::{AddEpisodeRequest, AddEpisodeResult, EntityEdge, EpisodeNode};

/// Buffered counter deltas for one UUID, applied in a single upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub uuid: String,
    pub loaded: u64,
    pub referenced: u64,
    pub success: u64,
    pub helpful: u64,
    pub harmful: u64,
}

impl UsageDelta {
    pub fn is_empty(&self) -> bool {
        self.loaded == 0
            && self.referenced == 0
            && self.success == 0
            && self.helpful == 0
            && self.harmful == 0
    }
}

/// Per-node utility movement reported by a counter flush. Consumers use
/// this to decide whether cached views (the adaptive index) are stale.
#[derive(Debug, Clone)]
pub struct UtilityShift {
    pub uuid: String,
    pub old_utility: f64,
    pub new_utility: f64,
    pub injection_tier: Option<String>,
}

impl UtilityShift {
    pub fn delta(&self) -> f64 {
        self.new_utility - self.old_utility
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    // ── Ingestion & retrieval ────────────────────────────────────────

    /// Write one episode. Only the ingestion funnel calls this.
    async fn add_episode(&self, req: AddEpisodeRequest) -> Result<AddEpisodeResult>;

    /// Semantic search over entity edges, scoped to `group_ids`.
    async fn search(
        &self,
        query: &str,
        group_ids: &[String],
        num_results: usize,
    ) -> Result<Vec<EntityEdge>>;

    /// Most recent episodes before `reference_time`.
    async fn retrieve_episodes(
        &self,
        reference_time: DateTime<Utc>,
        last_n: usize,
        group_ids: &[String],
    ) -> Result<Vec<EpisodeNode>>;

    async fn remove_episode(&self, uuid: &str) -> Result<bool>;

    async fn get_episode(&self, uuid: &str) -> Result<Option<EpisodeNode>>;

    async fn batch_get_episodes(&self, uuids: &[String]) -> Result<Vec<EpisodeNode>>;

    /// Episodes in the given tiers within `group_ids`, counters included.
    /// Used for mandate/guardrail candidate fetch and tier optimization.
    async fn fetch_episodes_by_tier(
        &self,
        group_ids: &[String],
        tiers: &[&str],
    ) -> Result<Vec<EpisodeNode>>;

    // ── Property updates ─────────────────────────────────────────────

    /// Merge arbitrary properties onto an episodic node. Returns false when
    /// the node does not exist.
    async fn set_episode_properties(
        &self,
        uuid: &str,
        props: serde_json::Map<String, Value>,
    ) -> Result<bool>;

    /// Rewrite the source-description tag string (promotion path).
    async fn update_source_description(&self, uuid: &str, source_description: &str)
        -> Result<bool>;

    // ── Usage counters ───────────────────────────────────────────────

    /// Apply buffered counter deltas in one upsert per UUID, bump
    /// `last_used_at`, and recompute `utility_score`. Handles the three node
    /// shapes a UUID may address (episodic, mentioned entity, relating
    /// edge). Returns the utility movement per updated node.
    async fn apply_usage_deltas(
        &self,
        deltas: &[UsageDelta],
        now: DateTime<Utc>,
    ) -> Result<Vec<UtilityShift>>;

    // ── Citations ────────────────────────────────────────────────────

    /// Exact-prefix UUID lookup restricted to `group_id`. Returns every
    /// match; the caller decides what >1 match means.
    async fn resolve_uuid_prefix(&self, prefix: &str, group_id: &str) -> Result<Vec<String>>;

    // ── Tier moves ───────────────────────────────────────────────────

    /// Demote: set tier, clear vector indexing, stamp reason.
    async fn demote_episode(
        &self,
        uuid: &str,
        new_tier: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Promote: set tier, stamp reason.
    async fn promote_episode(
        &self,
        uuid: &str,
        new_tier: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    // ── Canonical clustering / corrections ───────────────────────────

    /// Append a synonym (deduplicated) and bump `ref_count`. Returns the new
    /// synonym count, or `None` when the canonical node does not exist.
    async fn merge_synonym(&self, uuid: &str, synonym: &str) -> Result<Option<usize>>;

    /// Create a `REFINES` edge from a variation to its canonical.
    async fn create_refines_edge(&self, variation_uuid: &str, canonical_uuid: &str)
        -> Result<bool>;

    /// Create a correction node `REPLACES`-linked to the original, mark the
    /// original corrected and un-indexed. Returns the correction UUID.
    async fn create_correction(
        &self,
        original_uuid: &str,
        correction_content: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>>;

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Raw query execution against the backend. Reserved for specialized
    /// maintenance; the typed methods above cover the hot paths.
    async fn execute_query(&self, query: &str, params: Value) -> Result<Vec<Value>>;

    async fn health_check(&self) -> Result<()>;
}
