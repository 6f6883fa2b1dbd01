//! Citation markers: `[M:xxxxxxxx]` / `[G:xxxxxxxx]`.
//!
//! The LLM cites rules it applied using the first 8 hex chars of the
//! episode UUID. Parsing extracts the prefixes; resolution is an exact
//! prefix lookup restricted to the group id. A prefix matching more than
//! one episode is ambiguous - logged and skipped, never guessed.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use ah_domain::error::Result;
use ah_graph::GraphStore;

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[([MG]):([a-f0-9]{8})\]").expect("static regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationType {
    Mandate,
    Guardrail,
}

impl CitationType {
    pub fn marker(self) -> char {
        match self {
            CitationType::Mandate => 'M',
            CitationType::Guardrail => 'G',
        }
    }
}

/// A parsed citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub citation_type: CitationType,
    /// 8-char lowercase hex prefix of the full UUID.
    pub uuid_prefix: String,
}

/// Result of parsing citations from one response.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub citations: Vec<Citation>,
    pub mandate_count: usize,
    pub guardrail_count: usize,
    /// Unique prefixes in first-seen order.
    pub unique_prefixes: Vec<String>,
}

/// Parse all citations from a response.
pub fn parse_citations(text: &str) -> ParseResult {
    let mut result = ParseResult::default();
    if text.is_empty() {
        return result;
    }

    let mut seen: std::collections::HashSet<String> = Default::default();
    for cap in citation_regex().captures_iter(text) {
        let citation_type = match cap[1].to_ascii_uppercase().as_str() {
            "M" => CitationType::Mandate,
            _ => CitationType::Guardrail,
        };
        let prefix = cap[2].to_lowercase();

        match citation_type {
            CitationType::Mandate => result.mandate_count += 1,
            CitationType::Guardrail => result.guardrail_count += 1,
        }
        if seen.insert(prefix.clone()) {
            result.unique_prefixes.push(prefix.clone());
        }
        result.citations.push(Citation {
            citation_type,
            uuid_prefix: prefix,
        });
    }

    tracing::debug!(
        citations = result.citations.len(),
        mandates = result.mandate_count,
        guardrails = result.guardrail_count,
        "parsed citations"
    );
    result
}

/// Format a citation marker for a full UUID.
pub fn format_citation(uuid: &str, citation_type: CitationType) -> String {
    let prefix: String = uuid.chars().take(8).collect::<String>().to_lowercase();
    format!("[{}:{}]", citation_type.marker(), prefix)
}

/// Outcome of resolving a batch of prefixes.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// prefix → full UUID.
    pub resolved: HashMap<String, String>,
    /// Prefixes that matched more than one episode; skipped.
    pub ambiguous: Vec<String>,
    /// Prefixes with no match; ignored.
    pub unmatched: Vec<String>,
}

/// Resolve 8-char prefixes to full UUIDs within `group_id`.
pub async fn resolve_citations(
    graph: &dyn GraphStore,
    prefixes: &[String],
    group_id: &str,
) -> Result<ResolveOutcome> {
    let mut outcome = ResolveOutcome::default();

    for prefix in prefixes {
        let matches = graph.resolve_uuid_prefix(prefix, group_id).await?;
        match matches.len() {
            0 => outcome.unmatched.push(prefix.clone()),
            1 => {
                outcome
                    .resolved
                    .insert(prefix.clone(), matches.into_iter().next().unwrap());
            }
            n => {
                tracing::warn!(prefix = %prefix, matches = n, "ambiguous citation prefix, skipping");
                outcome.ambiguous.push(prefix.clone());
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_graph::testing::InMemoryGraph;
    use ah_graph::EpisodeNode;

    #[test]
    fn parses_both_citation_types() {
        let result = parse_citations(
            "Per [M:abc12345], we prefer async. Also avoid [G:def67890] and [g:0011aabb].",
        );
        assert_eq!(result.citations.len(), 3);
        assert_eq!(result.mandate_count, 1);
        assert_eq!(result.guardrail_count, 2);
        assert_eq!(result.unique_prefixes.len(), 3);
    }

    #[test]
    fn case_insensitive_and_lowercased() {
        let result = parse_citations("[m:ABC12345]");
        assert_eq!(result.citations[0].uuid_prefix, "abc12345");
        assert_eq!(result.citations[0].citation_type, CitationType::Mandate);
    }

    #[test]
    fn rejects_wrong_length_prefixes() {
        assert!(parse_citations("[M:abc123]").citations.is_empty());
        // 9-hex-char payloads don't match the 8-char grammar either.
        assert!(parse_citations("[M:abc123456]").citations.is_empty());
    }

    #[test]
    fn duplicate_prefixes_counted_once_in_unique() {
        let result = parse_citations("[M:abc12345] then again [M:abc12345]");
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.unique_prefixes, vec!["abc12345"]);
    }

    #[test]
    fn empty_text_empty_result() {
        let result = parse_citations("");
        assert!(result.citations.is_empty());
    }

    #[test]
    fn format_roundtrip() {
        let uuid = "a1b2c3d4-e5f6-7890-abcd-ef0123456789";
        let marker = format_citation(uuid, CitationType::Mandate);
        assert_eq!(marker, "[M:a1b2c3d4]");
        let parsed = parse_citations(&marker);
        assert_eq!(parsed.citations[0].uuid_prefix, "a1b2c3d4");
    }

    #[tokio::test]
    async fn resolve_happy_path_and_scoping() {
        let graph = InMemoryGraph::new();
        graph.seed_episode(EpisodeNode::new(
            "a1b2c3d4-e5f6-7890-abcd-ef0123456789",
            "n",
            "c",
            "global",
        ));

        let outcome = resolve_citations(&graph, &["a1b2c3d4".into()], "global")
            .await
            .unwrap();
        assert_eq!(
            outcome.resolved.get("a1b2c3d4").map(String::as_str),
            Some("a1b2c3d4-e5f6-7890-abcd-ef0123456789")
        );

        // Same prefix in the wrong scope: unmatched.
        let outcome = resolve_citations(&graph, &["a1b2c3d4".into()], "project-x")
            .await
            .unwrap();
        assert!(outcome.resolved.is_empty());
        assert_eq!(outcome.unmatched, vec!["a1b2c3d4"]);
    }

    #[tokio::test]
    async fn ambiguous_prefix_skipped() {
        let graph = InMemoryGraph::new();
        graph.seed_episode(EpisodeNode::new("deadbeef-1111", "a", "c", "global"));
        graph.seed_episode(EpisodeNode::new("deadbeef-2222", "b", "c", "global"));

        let outcome = resolve_citations(&graph, &["deadbeef".into()], "global")
            .await
            .unwrap();
        assert!(outcome.resolved.is_empty());
        assert_eq!(outcome.ambiguous, vec!["deadbeef"]);
    }
}
