//! Content deduplication for memory episodes.
//!
//! Hash-based exact duplicate detection with a time-window: normalize
//! whitespace, lowercase, SHA-256, then look for a recent semantic match
//! with the same hash.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use ah_domain::error::Result;
use ah_graph::GraphStore;

/// Normalize content for consistent hashing: collapse whitespace runs,
/// trim, lowercase.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_lowercase()
}

/// SHA-256 hex digest of normalized content.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_content(content);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Whether `content` matches a previously computed hash.
pub fn is_duplicate(content: &str, existing_hash: &str) -> bool {
    content_hash(content) == existing_hash
}

/// Find an exact duplicate episode within a time window.
///
/// Searches the graph for semantic neighbors and compares content hashes.
/// `window_minutes == 0` disables the window (any-age duplicates match).
/// Returns the UUID of the duplicate when found.
pub async fn find_exact_duplicate(
    graph: &dyn GraphStore,
    content: &str,
    window_minutes: i64,
    group_id: &str,
) -> Result<Option<String>> {
    let hash = content_hash(content);
    let cutoff = Utc::now() - Duration::minutes(window_minutes);

    let edges = graph
        .search(content, &[group_id.to_string()], 10)
        .await?;

    for edge in edges {
        if content_hash(&edge.fact) != hash {
            continue;
        }
        if window_minutes > 0 && edge.created_at < cutoff {
            continue;
        }
        // The edge's backing episode is the duplicate; fall back to the
        // edge uuid when no backref is present.
        let uuid = edge
            .episodes
            .first()
            .cloned()
            .unwrap_or_else(|| edge.uuid.clone());
        tracing::info!(
            uuid = %uuid,
            hash = %&hash[..16],
            window_minutes,
            "found exact duplicate"
        );
        return Ok(Some(uuid));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_content("  Use   Dependency\n\tInjection  "),
            "use dependency injection"
        );
    }

    #[test]
    fn hash_is_stable_across_formatting() {
        let a = content_hash("Use dependency injection for testability");
        let b = content_hash("  use   Dependency injection\nfor testability ");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(content_hash("fact one"), content_hash("fact two"));
    }

    #[test]
    fn is_duplicate_matches() {
        let h = content_hash("All I/O is async.");
        assert!(is_duplicate("all i/o is ASYNC.", &h));
        assert!(!is_duplicate("All I/O is sync.", &h));
    }
}
