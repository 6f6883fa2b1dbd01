//! Tool permission protocol for adapter-driven tool sessions.
//!
//! Read tools are always allowed; write tools pass through the
//! `write_enabled` → `yolo_mode` → callback → deny chain; unknown tools are
//! allowed (the provider-side sandbox is trusted). `PostToolUse` is
//! observation-only: hook failures there are logged, never block.

use async_trait::async_trait;
use serde_json::Value;

/// Tools that only read workspace state. Always allowed.
pub const READ_TOOLS: &[&str] = &[
    "read_file",
    "search_code",
    "list_files",
    "get_project_structure",
];

/// Tools that mutate workspace state. Gated.
pub const WRITE_TOOLS: &[&str] = &[
    "write_file",
    "edit_file",
    "delete_file",
    "create_directory",
];

/// Outcome of a `PreToolUse` evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { reason: String },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow)
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        PermissionDecision::Deny {
            reason: reason.into(),
        }
    }
}

/// Caller-supplied permission hook.
#[async_trait]
pub trait PermissionHook: Send + Sync {
    /// Consulted for write tools when `yolo_mode` is off.
    async fn pre_tool_use(&self, tool_name: &str, input: &Value) -> PermissionDecision;

    /// Fired after every tool execution with name/input/output. Failures
    /// here are the hook's problem; the session continues regardless.
    async fn after_tool(&self, _tool_name: &str, _input: &Value, _output: &str) {}
}

/// Evaluate the permission chain for one tool invocation.
pub async fn evaluate_tool_permission(
    tool_name: &str,
    input: &Value,
    write_enabled: bool,
    yolo_mode: bool,
    hook: Option<&dyn PermissionHook>,
) -> PermissionDecision {
    if READ_TOOLS.contains(&tool_name) {
        return PermissionDecision::Allow;
    }

    if WRITE_TOOLS.contains(&tool_name) {
        if !write_enabled {
            return PermissionDecision::deny("write tools are disabled for this session");
        }
        if yolo_mode {
            return PermissionDecision::Allow;
        }
        return match hook {
            Some(hook) => hook.pre_tool_use(tool_name, input).await,
            // No callback to ask - deny for safety.
            None => PermissionDecision::deny("no permission callback configured"),
        };
    }

    // Unknown tools run inside the provider-side sandbox.
    PermissionDecision::Allow
}

/// Fire the observation hook after a tool ran. Never propagates.
pub async fn fire_after_tool(
    hook: Option<&dyn PermissionHook>,
    tool_name: &str,
    input: &Value,
    output: &str,
) {
    if let Some(hook) = hook {
        hook.after_tool(tool_name, input, output).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysDeny;

    #[async_trait]
    impl PermissionHook for AlwaysDeny {
        async fn pre_tool_use(&self, _tool: &str, _input: &Value) -> PermissionDecision {
            PermissionDecision::deny("operator said no")
        }
    }

    struct AlwaysAllow;

    #[async_trait]
    impl PermissionHook for AlwaysAllow {
        async fn pre_tool_use(&self, _tool: &str, _input: &Value) -> PermissionDecision {
            PermissionDecision::Allow
        }
    }

    #[tokio::test]
    async fn read_tools_always_allowed() {
        let d = evaluate_tool_permission("read_file", &Value::Null, false, false, None).await;
        assert!(d.is_allowed());
    }

    #[tokio::test]
    async fn write_denied_when_writes_disabled() {
        let d =
            evaluate_tool_permission("write_file", &Value::Null, false, true, Some(&AlwaysAllow))
                .await;
        assert!(!d.is_allowed());
    }

    #[tokio::test]
    async fn yolo_mode_skips_callback() {
        let d =
            evaluate_tool_permission("edit_file", &Value::Null, true, true, Some(&AlwaysDeny))
                .await;
        assert!(d.is_allowed());
    }

    #[tokio::test]
    async fn callback_decision_honored() {
        let d =
            evaluate_tool_permission("delete_file", &Value::Null, true, false, Some(&AlwaysDeny))
                .await;
        assert_eq!(
            d,
            PermissionDecision::Deny {
                reason: "operator said no".into()
            }
        );
    }

    #[tokio::test]
    async fn write_without_callback_denied_for_safety() {
        let d = evaluate_tool_permission("write_file", &Value::Null, true, false, None).await;
        assert!(!d.is_allowed());
    }

    #[tokio::test]
    async fn unknown_tools_allowed() {
        let d = evaluate_tool_permission("run_notebook", &Value::Null, false, false, None).await;
        assert!(d.is_allowed());
    }
}
