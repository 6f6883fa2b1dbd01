//! DTOs for the graph-memory service.
//!
//! Field names use `camelCase` on the wire and `snake_case` in Rust via
//! `#[serde(rename_all = "camelCase")]`. Everything the service may omit is
//! `#[serde(default)]` so partially-populated nodes deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Episodic node
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An episodic node - the unit of stored knowledge.
///
/// Carries every property the core writes directly, plus the usage counters
/// maintained by the flush path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeNode {
    pub uuid: String,
    pub name: String,
    pub content: String,
    pub group_id: String,
    #[serde(default)]
    pub source_description: String,

    /// "mandate" | "guardrail" | "reference".
    #[serde(default)]
    pub injection_tier: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub auto_inject: bool,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub trigger_task_types: Vec<String>,
    /// false excludes the node from semantic search entirely.
    #[serde(default = "default_true")]
    pub vector_indexed: bool,

    #[serde(default)]
    pub loaded_count: u64,
    #[serde(default)]
    pub referenced_count: u64,
    #[serde(default)]
    pub helpful_count: u64,
    #[serde(default)]
    pub harmful_count: u64,
    #[serde(default)]
    pub success_count: u64,
    /// success/referenced once referenced, else 0. Recomputed on flush.
    #[serde(default)]
    pub utility_score: f64,

    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub ref_count: u64,

    #[serde(default)]
    pub has_correction: bool,
    #[serde(default)]
    pub correction_uuid: Option<String>,
    #[serde(default)]
    pub is_correction: bool,
    #[serde(default)]
    pub corrects_uuid: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub demoted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub demotion_reason: Option<String>,
    #[serde(default)]
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub promotion_reason: Option<String>,
}

fn default_true() -> bool {
    true
}

impl EpisodeNode {
    /// A fresh node with defaulted counters, used by test doubles and the
    /// correction workflow.
    pub fn new(
        uuid: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            content: content.into(),
            group_id: group_id.into(),
            source_description: String::new(),
            injection_tier: None,
            summary: None,
            pinned: false,
            auto_inject: false,
            display_order: None,
            trigger_task_types: Vec::new(),
            vector_indexed: true,
            loaded_count: 0,
            referenced_count: 0,
            helpful_count: 0,
            harmful_count: 0,
            success_count: 0,
            utility_score: 0.0,
            synonyms: Vec::new(),
            ref_count: 0,
            has_correction: false,
            correction_uuid: None,
            is_correction: false,
            corrects_uuid: None,
            created_at: Utc::now(),
            valid_at: None,
            last_used_at: None,
            demoted_at: None,
            demotion_reason: None,
            promoted_at: None,
            promotion_reason: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity edge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A relation between two entities, returned by semantic search.
///
/// `score` is populated at search time; `episodes` backreferences the
/// episodic nodes that contributed the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityEdge {
    pub uuid: String,
    pub fact: String,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub source_description: String,
    #[serde(default)]
    pub source_node_name: Option<String>,
    #[serde(default)]
    pub target_node_name: Option<String>,
    #[serde(default)]
    pub episodes: Vec<String>,
    #[serde(default)]
    pub injection_tier: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Requests / responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `POST /episodes` - request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEpisodeRequest {
    pub name: String,
    pub episode_body: String,
    pub source_type: String,
    pub source_description: String,
    pub reference_time: DateTime<Utc>,
    pub group_id: String,
}

/// `POST /episodes` - response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEpisodeResult {
    pub episode_uuid: String,
    #[serde(default)]
    pub node_uuids: Vec<String>,
    #[serde(default)]
    pub edge_uuids: Vec<String>,
}
