//! Provider-agnostic completion request/response types.
//!
//! Feature differences between providers (thinking budgets, containers,
//! structured-output mechanics) are expressed as optional fields. A provider
//! that does not support a field treats it as a no-op, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, ToolCall, ToolDefinition};
use crate::thinking::ThinkingLevel;

/// A provider-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Model identifier override. `None` uses the adapter default.
    pub model: Option<String>,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Extended-thinking level; mapped to a provider-specific budget.
    pub thinking_level: Option<ThinkingLevel>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Structured-output request.
    pub response_format: Option<ResponseFormat>,
    /// Enable the provider-side programmatic tool sandbox (Claude only).
    pub enable_programmatic_tools: bool,
    /// Reuse an existing provider-side container (Claude only).
    pub container_id: Option<String>,
    /// Working directory for tool execution.
    pub working_dir: Option<String>,
}

/// Structured-output request: `{type: "json_object", schema?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object".into(),
            schema: None,
        }
    }

    pub fn json_schema(schema: serde_json::Value) -> Self {
        Self {
            format_type: "json_object".into(),
            schema: Some(schema),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
}

/// Handle to a provider-side execution container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

/// Prompt-cache accounting reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub cache_creation_input_tokens: u32,
    pub cache_read_input_tokens: u32,
}

/// A provider-agnostic completion response.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    /// Textual content of the response.
    pub content: String,
    /// The model that actually produced the response.
    pub model: String,
    /// Which adapter produced this ("claude", "gemini").
    pub provider: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
    /// Extended-thinking content, when requested and supported.
    pub thinking_content: Option<String>,
    pub thinking_tokens: Option<u32>,
    /// Tool calls emitted by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Container handle, when the provider allocated one.
    pub container: Option<ContainerHandle>,
    pub cache_metrics: Option<CacheMetrics>,
}

impl CompletionResult {
    /// Minimal result for error/synthetic paths.
    pub fn empty(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            model: model.into(),
            provider: provider.into(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::EndTurn,
            thinking_content: None,
            thinking_tokens: None,
            tool_calls: Vec::new(),
            container: None,
            cache_metrics: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinishReason::EndTurn).unwrap(),
            r#""end_turn""#
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolUse).unwrap(),
            r#""tool_use""#
        );
    }

    #[test]
    fn response_format_schema_roundtrip() {
        let rf = ResponseFormat::json_schema(serde_json::json!({"type": "object"}));
        let json = serde_json::to_value(&rf).unwrap();
        assert_eq!(json["type"], "json_object");
        assert_eq!(json["schema"]["type"], "object");
    }
}
