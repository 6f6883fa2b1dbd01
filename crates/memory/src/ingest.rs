//! The single ingestion funnel.
//!
//! Every episode write in the codebase flows through
//! [`EpisodeCreator::create`]: validation (reject conversational phrasing),
//! hash-window deduplication, metadata tagging, then exactly one
//! `GraphStore::add_episode` call. Nothing else writes episodes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;

use ah_domain::error::Result;
use ah_domain::scope::{build_group_id, MemoryScope};
use ah_domain::tier::InjectionTier;
use ah_graph::{AddEpisodeRequest, GraphStore};

use crate::dedup::find_exact_duplicate;
use crate::source_desc::SourceTags;

/// Phrases that mark content as conversational rather than declarative.
/// Episodes are facts; advice-shaped text is rejected at the gate.
pub const VERBOSE_PATTERNS: &[&str] = &[
    "you should",
    "i recommend",
    "please",
    "thank you",
    "let me know",
    "feel free",
    "i suggest",
    "you might want",
    "consider using",
    "it would be",
    "it's important to",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ingestion profiles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for episode ingestion behavior.
#[derive(Debug, Clone, Copy)]
pub struct IngestionConfig {
    /// Reject verbose/conversational content.
    pub validate: bool,
    /// Check for duplicate content before writing.
    pub deduplicate: bool,
    /// Dedup time window in minutes; 0 = no window (any age matches).
    pub dedup_window_minutes: i64,
    pub tier: InjectionTier,
    /// Golden standards carry confidence 100 and the golden origin tag.
    pub is_golden: bool,
}

/// Golden standards: highest confidence, no dedup window.
pub const GOLDEN_STANDARD: IngestionConfig = IngestionConfig {
    validate: true,
    deduplicate: true,
    dedup_window_minutes: 0,
    tier: InjectionTier::Mandate,
    is_golden: true,
};

/// Chat/stream content: minimal validation, short dedup window.
pub const CHAT_STREAM: IngestionConfig = IngestionConfig {
    validate: false,
    deduplicate: true,
    dedup_window_minutes: 1,
    tier: InjectionTier::Reference,
    is_golden: false,
};

/// Runtime learnings: standard validation and dedup.
pub const LEARNING: IngestionConfig = IngestionConfig {
    validate: true,
    deduplicate: true,
    dedup_window_minutes: 5,
    tier: InjectionTier::Reference,
    is_golden: false,
};

/// Tool discoveries: facts learned about the codebase.
pub const TOOL_DISCOVERY: IngestionConfig = IngestionConfig {
    validate: true,
    deduplicate: true,
    dedup_window_minutes: 5,
    tier: InjectionTier::Reference,
    is_golden: false,
};

/// Gotchas/pitfalls: guardrail tier to prevent repeated mistakes.
pub const TOOL_GOTCHA: IngestionConfig = IngestionConfig {
    validate: true,
    deduplicate: true,
    dedup_window_minutes: 5,
    tier: InjectionTier::Guardrail,
    is_golden: false,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Creator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of an episode creation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateResult {
    pub success: bool,
    pub uuid: Option<String>,
    pub deduplicated: bool,
    pub validation_error: Option<String>,
    pub detected_patterns: Vec<String>,
}

/// Single entry point for all episode creation.
pub struct EpisodeCreator {
    graph: Arc<dyn GraphStore>,
    group_id: String,
}

impl EpisodeCreator {
    pub fn new(graph: Arc<dyn GraphStore>, scope: MemoryScope, scope_id: Option<&str>) -> Self {
        Self {
            graph,
            group_id: build_group_id(scope, scope_id),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Create a new episode.
    ///
    /// This is the ONLY call site of `GraphStore::add_episode`. A duplicate
    /// within the window is a success shape, not an error:
    /// `{success: true, deduplicated: true, uuid: <existing>}`.
    pub async fn create(
        &self,
        content: &str,
        name: &str,
        config: IngestionConfig,
        source_description: Option<String>,
        reference_time: Option<DateTime<Utc>>,
    ) -> Result<CreateResult> {
        let reference_time = reference_time.unwrap_or_else(Utc::now);

        // Step 1: validate.
        if config.validate {
            let detected = detect_verbose_patterns(content);
            if !detected.is_empty() {
                return Ok(CreateResult {
                    success: false,
                    validation_error: Some(format!(
                        "Content is too verbose. Write declarative facts, not conversational \
                         advice. Detected patterns: {}",
                        detected
                            .iter()
                            .map(|p| format!("'{p}'"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
                    detected_patterns: detected,
                    ..Default::default()
                });
            }
        }

        // Step 2: deduplicate.
        if config.deduplicate {
            if let Some(existing) = find_exact_duplicate(
                self.graph.as_ref(),
                content,
                config.dedup_window_minutes,
                &self.group_id,
            )
            .await?
            {
                tracing::debug!(uuid = %existing, "skipping duplicate content");
                return Ok(CreateResult {
                    success: true,
                    uuid: Some(existing),
                    deduplicated: true,
                    ..Default::default()
                });
            }
        }

        // Step 3: build the metadata tag string.
        let source_description =
            source_description.unwrap_or_else(|| default_source_description(&config));

        // Step 4: the one write.
        let result = self
            .graph
            .add_episode(AddEpisodeRequest {
                name: name.to_string(),
                episode_body: content.to_string(),
                source_type: "text".into(),
                source_description,
                reference_time,
                group_id: self.group_id.clone(),
            })
            .await?;

        tracing::info!(
            uuid = %result.episode_uuid,
            nodes = result.node_uuids.len(),
            edges = result.edge_uuids.len(),
            "created episode"
        );

        Ok(CreateResult {
            success: true,
            uuid: Some(result.episode_uuid),
            ..Default::default()
        })
    }
}

/// Verbose phrases present in `content`, lowercased match.
pub fn detect_verbose_patterns(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    VERBOSE_PATTERNS
        .iter()
        .filter(|p| lower.contains(*p))
        .map(|p| p.to_string())
        .collect()
}

fn default_source_description(config: &IngestionConfig) -> String {
    let mut tags = SourceTags {
        tier: Some(config.tier),
        ..Default::default()
    };
    if config.is_golden {
        tags.origin = Some("golden_standard".into());
        tags.confidence = Some(100.0);
    }
    tags.format()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Markdown chunking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A section of a markdown document prepared for ingestion.
#[derive(Debug, Clone)]
pub struct MarkdownChunk {
    pub title: Option<String>,
    pub content: String,
    pub tier: InjectionTier,
    pub is_anti_pattern: bool,
}

/// Split markdown on H2 headers into per-section chunks.
///
/// Whole files don't make useful episodes; sections do. Sections smelling
/// of anti-patterns route to the guardrail tier.
pub fn chunk_markdown_sections(
    content: &str,
    min_chunk_size: usize,
    max_chunk_size: usize,
) -> Vec<MarkdownChunk> {
    let anti_re = Regex::new(r"(?i)anti.?pattern|don'?t|avoid|never|wrong|bad").expect("static");
    let title_re = Regex::new(r"(?m)^## (.+)$").expect("static");

    let mut sections: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in content.lines() {
        if line.starts_with("## ") && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }

    sections
        .into_iter()
        .filter_map(|section| {
            let section = section.trim().to_string();
            if section.len() < min_chunk_size {
                return None;
            }
            let mut body = section;
            if body.len() > max_chunk_size {
                body.truncate(max_chunk_size);
            }
            let title = title_re
                .captures(&body)
                .map(|c| c[1].trim().to_string());
            let is_anti = anti_re.is_match(&body);
            Some(MarkdownChunk {
                title,
                content: body,
                tier: if is_anti {
                    InjectionTier::Guardrail
                } else {
                    InjectionTier::Reference
                },
                is_anti_pattern: is_anti,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_graph::testing::InMemoryGraph;

    fn creator(graph: &Arc<InMemoryGraph>) -> EpisodeCreator {
        EpisodeCreator::new(graph.clone(), MemoryScope::Global, None)
    }

    #[tokio::test]
    async fn verbose_content_rejected_with_patterns() {
        let graph = Arc::new(InMemoryGraph::new());
        let result = creator(&graph)
            .create(
                "You should please use async everywhere",
                "bad_style",
                LEARNING,
                None,
                None,
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.uuid.is_none());
        assert!(result.detected_patterns.contains(&"you should".to_string()));
        assert!(result.detected_patterns.contains(&"please".to_string()));
        assert_eq!(graph.episode_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_within_window_returns_existing_uuid() {
        let graph = Arc::new(InMemoryGraph::new());
        let c = creator(&graph);

        let first = c
            .create(
                "Use dependency injection for testability",
                "di",
                LEARNING,
                None,
                None,
            )
            .await
            .unwrap();
        assert!(first.success && !first.deduplicated);

        let second = c
            .create(
                "Use dependency injection for testability",
                "di_again",
                LEARNING,
                None,
                None,
            )
            .await
            .unwrap();
        assert!(second.success);
        assert!(second.deduplicated);
        assert_eq!(second.uuid, first.uuid);
        assert_eq!(graph.episode_count(), 1);
    }

    #[tokio::test]
    async fn golden_profile_writes_mandate_with_full_confidence() {
        let graph = Arc::new(InMemoryGraph::new());
        let result = creator(&graph)
            .create(
                "All I/O is async. Never use sync methods.",
                "async_rule",
                GOLDEN_STANDARD,
                None,
                None,
            )
            .await
            .unwrap();

        assert!(result.success && !result.deduplicated);
        let node = graph.episode(result.uuid.as_deref().unwrap()).unwrap();
        assert_eq!(node.injection_tier.as_deref(), Some("mandate"));
        let tags = SourceTags::parse(&node.source_description);
        assert!(tags.is_golden());
        assert_eq!(tags.confidence, Some(100.0));
    }

    #[tokio::test]
    async fn chat_stream_skips_validation() {
        let graph = Arc::new(InMemoryGraph::new());
        let result = creator(&graph)
            .create("please remember I like tabs", "chat", CHAT_STREAM, None, None)
            .await
            .unwrap();
        assert!(result.success);
    }

    #[test]
    fn chunking_splits_on_h2_and_detects_anti_patterns() {
        let doc = "\
# Standards

## Naming
Functions are snake_case. Types are UpperCamelCase. Constants are SCREAMING_SNAKE.

## Anti-pattern: God Objects
Never put unrelated state in one struct. Avoid grab-bag modules entirely.
";
        let chunks = chunk_markdown_sections(doc, 50, 2000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title.as_deref(), Some("Naming"));
        assert_eq!(chunks[0].tier, InjectionTier::Reference);
        assert!(chunks[1].is_anti_pattern);
        assert_eq!(chunks[1].tier, InjectionTier::Guardrail);
    }

    #[test]
    fn chunking_skips_tiny_sections() {
        let doc = "## A\nshort\n\n## B\nThis section is long enough to keep around for ingestion purposes.";
        let chunks = chunk_markdown_sections(doc, 50, 2000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title.as_deref(), Some("B"));
    }
}
