//! Memory scoping.
//!
//! Scopes are isolating namespaces over the knowledge graph. Every episode
//! belongs to exactly one `group_id`; cross-scope reads are explicit
//! (project queries may fold in global, never the reverse).

use serde::{Deserialize, Serialize};

/// Group id for the global scope.
pub const GLOBAL_GROUP_ID: &str = "global";

/// An isolating namespace for episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Global,
    Project,
}

impl MemoryScope {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryScope::Global => "global",
            MemoryScope::Project => "project",
        }
    }
}

impl std::str::FromStr for MemoryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(MemoryScope::Global),
            "project" => Ok(MemoryScope::Project),
            other => Err(format!("unknown memory scope: {other}")),
        }
    }
}

/// Replace characters that would collide with group-id structure.
fn sanitize_scope_id(id: &str) -> String {
    id.replace([':', '/'], "-")
}

/// Build the graph `group_id` for a scope.
///
/// `global` | `project-<sanitized-id>`. A project scope without an id falls
/// back to `project-default`.
pub fn build_group_id(scope: MemoryScope, scope_id: Option<&str>) -> String {
    match scope {
        MemoryScope::Global => GLOBAL_GROUP_ID.to_string(),
        MemoryScope::Project => {
            let id = scope_id.unwrap_or("default");
            format!("project-{}", sanitize_scope_id(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_group_id() {
        assert_eq!(build_group_id(MemoryScope::Global, None), "global");
        // Scope id is ignored for global
        assert_eq!(build_group_id(MemoryScope::Global, Some("x")), "global");
    }

    #[test]
    fn project_group_id_sanitized() {
        assert_eq!(
            build_group_id(MemoryScope::Project, Some("org/repo:main")),
            "project-org-repo-main"
        );
    }

    #[test]
    fn project_without_id_uses_default() {
        assert_eq!(
            build_group_id(MemoryScope::Project, None),
            "project-default"
        );
    }
}
