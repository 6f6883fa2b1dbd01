//! Learning extraction and reinforcement-based promotion.
//!
//! Session transcripts go through a cheap LLM that returns a JSON array of
//! candidate learnings. Parsing is defensive: first `[...]` block, skip
//! malformed items, cap at 10. Learnings below confidence 70 are dropped;
//! 70–89 store as provisional, 90+ as canonical. A new learning that
//! semantically matches an existing provisional one reinforces it instead
//! of storing a duplicate - enough reinforcement promotes it.

use std::sync::Arc;

use ah_domain::completion::CompletionRequest;
use ah_domain::error::Result;
use ah_domain::message::Message;
use ah_graph::GraphStore;
use ah_providers::structured::extract_json_array;
use ah_providers::ProviderAdapter;

use crate::ingest::{EpisodeCreator, LEARNING};
use crate::source_desc::{promote_status, replace_confidence, SourceTags};

/// Below this, a learning is noise and skipped.
pub const PROVISIONAL_THRESHOLD: f64 = 70.0;
/// At or above this, a learning is trusted immediately.
pub const CANONICAL_THRESHOLD: f64 = 90.0;

/// Similarity above which two learnings are "the same".
const REINFORCEMENT_SIMILARITY: f64 = 0.8;

/// Transcripts over this are truncated to the trailing window.
const MAX_TRANSCRIPT_CHARS: usize = 15_000;
const TRANSCRIPT_TAIL_CHARS: usize = 12_000;

const MAX_LEARNINGS_PER_SESSION: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningType {
    /// Explicitly confirmed by the user.
    Verified,
    /// Derived from successful task completion.
    Inference,
    /// Observed pattern across interactions.
    Pattern,
}

impl LearningType {
    fn parse(s: &str) -> LearningType {
        match s.to_ascii_lowercase().as_str() {
            "verified" => LearningType::Verified,
            "inference" => LearningType::Inference,
            // Information-preserving default.
            _ => LearningType::Pattern,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            LearningType::Verified => "verified",
            LearningType::Inference => "inference",
            LearningType::Pattern => "pattern",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedLearning {
    pub content: String,
    pub learning_type: LearningType,
    pub confidence: f64,
    pub source_quote: Option<String>,
    pub category: String,
}

/// Result of extracting learnings from one session.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub session_id: String,
    pub learnings: Vec<ExtractedLearning>,
    pub stored_count: usize,
    pub provisional_count: usize,
    pub canonical_count: usize,
    pub reinforced_count: usize,
    pub skipped_count: usize,
}

/// Outcome of checking a new learning against existing provisional ones.
#[derive(Debug, Clone, Default)]
pub struct ReinforcementOutcome {
    pub found_match: bool,
    pub promoted: bool,
    pub matched_uuid: Option<String>,
    pub new_confidence: Option<f64>,
}

const EXTRACTION_PROMPT: &str = "\
Analyze this agent session transcript and extract learnings.

For each learning, determine:
1. Type: verified (user explicitly confirmed), inference (derived from a \
successful task), or pattern (observed practice)
2. Category: coding_standard, troubleshooting_guide, system_design, \
operational_context, or domain_knowledge
3. Confidence: 60-100, adjusted by evidence strength

Output as a JSON array:
[
  {
    \"content\": \"Clear, actionable statement of the learning\",
    \"learning_type\": \"verified|inference|pattern\",
    \"confidence\": 60,
    \"source_quote\": \"Brief supporting quote\",
    \"category\": \"domain_knowledge\"
  }
]

Rules:
- Extract ONLY actionable learnings, not observations about the conversation
- Skip trivial or single-use facts
- Maximum 10 learnings
- Each learning must be self-contained

SESSION TRANSCRIPT:
";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extractor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LearningExtractor {
    graph: Arc<dyn GraphStore>,
    adapter: Arc<dyn ProviderAdapter>,
    model: Option<String>,
}

impl LearningExtractor {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        adapter: Arc<dyn ProviderAdapter>,
        model: Option<String>,
    ) -> Self {
        Self {
            graph,
            adapter,
            model,
        }
    }

    /// Extract learnings from a transcript and store them through the
    /// funnel. Shared knowledge goes to the global scope, so the creator
    /// should be global-scoped.
    pub async fn extract(
        &self,
        creator: &EpisodeCreator,
        session_id: &str,
        transcript: &str,
    ) -> Result<ExtractionResult> {
        let mut result = ExtractionResult {
            session_id: session_id.to_string(),
            ..Default::default()
        };

        let transcript = truncate_transcript(transcript);
        let prompt = format!("{EXTRACTION_PROMPT}{transcript}");

        let response = match self
            .adapter
            .complete(CompletionRequest {
                messages: vec![Message::user(prompt)],
                model: self.model.clone(),
                max_tokens: Some(4096),
                ..Default::default()
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(session_id, error = %e, "learning extraction call failed");
                return Ok(result);
            }
        };

        result.learnings = parse_learnings(&response.content);

        for learning in result.learnings.clone() {
            if learning.confidence < PROVISIONAL_THRESHOLD {
                result.skipped_count += 1;
                continue;
            }

            // Reinforce instead of storing a near-duplicate.
            let reinforcement = self
                .check_and_reinforce(&learning.content, learning.confidence)
                .await?;
            if reinforcement.found_match {
                result.reinforced_count += 1;
                result.stored_count += 1;
                if reinforcement.promoted {
                    result.canonical_count += 1;
                } else {
                    result.provisional_count += 1;
                }
                continue;
            }

            let status = if learning.confidence >= CANONICAL_THRESHOLD {
                "canonical"
            } else {
                "provisional"
            };
            let source_description = format!(
                "{} {} confidence:{:.0} status:{status}",
                learning.category,
                learning.learning_type.as_str(),
                learning.confidence,
            );

            let name = format!("learning_{}", &session_id[..session_id.len().min(8)]);
            let created = creator
                .create(
                    &learning.content,
                    &name,
                    LEARNING,
                    Some(source_description),
                    None,
                )
                .await?;

            if created.success && !created.deduplicated {
                result.stored_count += 1;
                if status == "canonical" {
                    result.canonical_count += 1;
                } else {
                    result.provisional_count += 1;
                }
            } else {
                result.skipped_count += 1;
            }
        }

        tracing::info!(
            session_id,
            stored = result.stored_count,
            canonical = result.canonical_count,
            provisional = result.provisional_count,
            reinforced = result.reinforced_count,
            skipped = result.skipped_count,
            "learning extraction complete"
        );
        Ok(result)
    }

    /// Look for a semantically matching provisional learning; reinforce it.
    ///
    /// Reinforcement averages the confidences and adds a boost:
    /// `min(100, (old + new)/2 + 10)`. Crossing 90 promotes to canonical.
    pub async fn check_and_reinforce(
        &self,
        content: &str,
        confidence: f64,
    ) -> Result<ReinforcementOutcome> {
        let mut outcome = ReinforcementOutcome::default();

        let edges = self
            .graph
            .search(content, &["global".to_string()], 5)
            .await?;

        for edge in edges {
            if edge.score < REINFORCEMENT_SIMILARITY {
                continue;
            }
            let tags = SourceTags::parse(&edge.source_description);
            if !tags.is_provisional() {
                continue;
            }

            let target_uuid = edge
                .episodes
                .first()
                .cloned()
                .unwrap_or_else(|| edge.uuid.clone());
            let existing_conf = tags.confidence.unwrap_or(PROVISIONAL_THRESHOLD);
            let new_conf = ((existing_conf + confidence) / 2.0 + 10.0).min(100.0);

            outcome.found_match = true;
            outcome.matched_uuid = Some(target_uuid.clone());
            outcome.new_confidence = Some(new_conf);

            let new_desc = if new_conf >= CANONICAL_THRESHOLD {
                outcome.promoted = true;
                promote_status(
                    &replace_confidence(&edge.source_description, new_conf),
                    None,
                )
            } else {
                replace_confidence(&edge.source_description, new_conf)
            };

            self.graph
                .update_source_description(&target_uuid, &new_desc)
                .await?;

            tracing::info!(
                uuid = %target_uuid,
                old_confidence = existing_conf,
                new_confidence = new_conf,
                promoted = outcome.promoted,
                "reinforced existing learning"
            );
            // Only the first match counts.
            return Ok(outcome);
        }

        Ok(outcome)
    }

    /// Manual promotion: flip a learning to canonical, optionally recording
    /// the reason.
    pub async fn promote_learning(&self, uuid: &str, reason: Option<&str>) -> Result<bool> {
        let Some(node) = self.graph.get_episode(uuid).await? else {
            return Ok(false);
        };
        let tags = SourceTags::parse(&node.source_description);
        if tags.is_canonical() {
            return Ok(false);
        }

        let new_desc = promote_status(&node.source_description, reason);
        let updated = self.graph.update_source_description(uuid, &new_desc).await?;
        if updated {
            tracing::info!(uuid, reason = reason.unwrap_or("none"), "manually promoted learning");
        }
        Ok(updated)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn truncate_transcript(transcript: &str) -> String {
    if transcript.len() <= MAX_TRANSCRIPT_CHARS {
        return transcript.to_string();
    }
    let tail_start = transcript.len() - TRANSCRIPT_TAIL_CHARS;
    // Snap to a char boundary.
    let tail_start = (tail_start..transcript.len())
        .find(|&i| transcript.is_char_boundary(i))
        .unwrap_or(tail_start);
    format!("...[truncated]...\n{}", &transcript[tail_start..])
}

/// Parse the LLM's JSON array. Malformed items are skipped, the list is
/// capped at ten.
pub fn parse_learnings(response_text: &str) -> Vec<ExtractedLearning> {
    let Some(items) = extract_json_array(response_text) else {
        tracing::warn!("no JSON array found in learning extraction response");
        return Vec::new();
    };

    let mut learnings = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(content) = obj.get("content").and_then(|v| v.as_str()) else {
            continue;
        };
        if content.is_empty() {
            continue;
        }

        learnings.push(ExtractedLearning {
            content: content.to_string(),
            learning_type: LearningType::parse(
                obj.get("learning_type").and_then(|v| v.as_str()).unwrap_or("pattern"),
            ),
            confidence: obj
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(60.0),
            source_quote: obj
                .get("source_quote")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            category: obj
                .get("category")
                .and_then(|v| v.as_str())
                .unwrap_or("domain_knowledge")
                .to_string(),
        });
        if learnings.len() >= MAX_LEARNINGS_PER_SESSION {
            break;
        }
    }
    learnings
}
