//! Gemini adapter - API-key REST.
//!
//! Talks to the `generateContent` / `streamGenerateContent` endpoints,
//! retries transient failures, and runs external tool loops locally: Gemini
//! has no provider-side sandbox, so tool calls are executed through the
//! caller-supplied [`ToolHandler`] behind the permission protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use ah_domain::completion::{CompletionRequest, CompletionResult, FinishReason};
use ah_domain::config::ProviderConfig;
use ah_domain::error::{Error, Result};
use ah_domain::message::{
    ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition, ToolExecutionResult,
};
use ah_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::permissions::{evaluate_tool_permission, fire_after_tool};
use crate::retry::with_retries;
use crate::sse::sse_response_stream;
use crate::structured::extract_json;
use crate::traits::{AgentMessage, ProviderAdapter, ToolLoopRequest};
use crate::util::{from_reqwest, resolve_api_key};

/// Cap on external tool-loop rounds; mirrors the agent runner's turn cap.
const MAX_TOOL_ROUNDS: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GeminiAdapter {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".into());
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "gemini-2.0-flash".into());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            max_retries: cfg.max_retries,
            client,
        })
    }

    fn model_for(&self, req: &CompletionRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:{method}?key={}",
            self.base_url, self.api_key
        )
    }

    // ── Request serialization ────────────────────────────────────────

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let mut system_parts: Vec<String> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.extract_all_text()),
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{"text": msg.content.extract_all_text()}],
                })),
                Role::Assistant => contents.push(assistant_to_gemini(msg)),
                Role::Tool => contents.push(tool_result_to_gemini(msg)),
            }
        }

        let mut body = json!({ "contents": contents });

        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({
                "parts": [{"text": system_parts.join("\n\n")}],
            });
        }

        if !req.tools.is_empty() {
            let decls: Vec<Value> = req.tools.iter().map(tool_to_gemini).collect();
            body["tools"] = json!([{ "functionDeclarations": decls }]);
        }

        let mut generation: serde_json::Map<String, Value> = Default::default();
        if let Some(temp) = req.temperature {
            generation.insert("temperature".into(), json!(temp));
        }
        if let Some(max) = req.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(max));
        }
        if let Some(ref rf) = req.response_format {
            if rf.format_type == "json_object" {
                generation.insert("responseMimeType".into(), json!("application/json"));
                if let Some(ref schema) = rf.schema {
                    generation.insert("responseSchema".into(), schema.clone());
                }
            }
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        body
    }

    async fn post_once(&self, url: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();

        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(Error::RateLimit {
                retry_after_secs: retry_after,
            });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("gemini auth failed: {body}")));
        }

        let retriable = status.is_server_error();
        let text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {text}", status.as_u16()),
                retriable,
            });
        }
        serde_json::from_str(&text).map_err(Error::Json)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn assistant_to_gemini(msg: &Message) -> Value {
    let parts: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![json!({"text": t})],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(json!({"text": text})),
                ContentPart::ToolUse { name, input, .. } => Some(json!({
                    "functionCall": {"name": name, "args": input},
                })),
                _ => None,
            })
            .collect(),
    };
    json!({ "role": "model", "parts": parts })
}

fn tool_result_to_gemini(msg: &Message) -> Value {
    let parts: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some(json!({
                    "functionResponse": {
                        "name": tool_use_id,
                        "response": {"output": content},
                    },
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![json!({
            "functionResponse": {"name": "tool", "response": {"output": t}},
        })],
    };
    json!({ "role": "user", "parts": parts })
}

fn tool_to_gemini(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_gemini_response(
    body: &Value,
    provider: &str,
    model: &str,
    wants_json: bool,
) -> CompletionResult {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    let candidate = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first());

    if let Some(parts) = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                text_parts.push(text.to_string());
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                tool_calls.push(ToolCall {
                    call_id: format!("{name}-{}", Uuid::new_v4().simple()),
                    tool_name: name,
                    arguments: call.get("args").cloned().unwrap_or(json!({})),
                });
            }
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        FinishReason::ToolUse
    } else {
        match candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(Value::as_str)
        {
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        }
    };

    let usage = body.get("usageMetadata");
    let input_tokens = usage
        .and_then(|u| u.get("promptTokenCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let output_tokens = usage
        .and_then(|u| u.get("candidatesTokenCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let thinking_tokens = usage
        .and_then(|u| u.get("thoughtsTokenCount"))
        .and_then(Value::as_u64)
        .map(|v| v as u32);

    let mut content = text_parts.join("");
    if wants_json {
        if let Some(found) = extract_json(&content) {
            content = found.to_string();
        }
    }

    CompletionResult {
        content,
        model: model.to_string(),
        provider: provider.to_string(),
        input_tokens,
        output_tokens,
        finish_reason,
        thinking_content: None,
        thinking_tokens,
        tool_calls,
        container: None,
        cache_metrics: None,
    }
}

/// Parse one SSE chunk of a streaming response.
fn parse_gemini_sse(data: &str, usage_slot: &mut Option<Usage>) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let mut events = Vec::new();

    if let Some(u) = v.get("usageMetadata") {
        *usage_slot = Some(Usage {
            input_tokens: u
                .get("promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            output_tokens: u
                .get("candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            thinking_tokens: 0,
        });
    }

    let candidate = v
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first());

    if let Some(parts) = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(Ok(StreamEvent::Content {
                        text: text.to_string(),
                    }));
                }
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                events.push(Ok(StreamEvent::ToolCall {
                    call_id: format!("{name}-{}", Uuid::new_v4().simple()),
                    tool_name: name,
                    arguments: call.get("args").cloned().unwrap_or(json!({})),
                }));
            }
        }
    }

    if let Some(reason) = candidate
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
    {
        let mapped = match reason {
            "MAX_TOKENS" => "max_tokens",
            _ => "end_turn",
        };
        events.push(Ok(StreamEvent::Done {
            usage: usage_slot.clone(),
            finish_reason: Some(mapped.into()),
        }));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.id
    }

    fn auth_mode(&self) -> &str {
        "api_key"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResult> {
        let model = self.model_for(&req);
        let url = self.endpoint(&model, "generateContent");
        let body = self.build_body(&req);
        let wants_json = req
            .response_format
            .as_ref()
            .map(|rf| rf.format_type == "json_object")
            .unwrap_or(false);

        tracing::debug!(provider = %self.id, model = %model, "gemini chat request");

        let response = with_retries(self.max_retries, || self.post_once(&url, &body)).await?;
        Ok(parse_gemini_response(&response, &self.id, &model, wants_json))
    }

    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = self.model_for(&req);
        let url = format!(
            "{}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.api_key
        );
        let body = self.build_body(&req);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {text}", status.as_u16()),
                retriable: status.is_server_error(),
            });
        }

        let mut usage: Option<Usage> = None;
        Ok(sse_response_stream(resp, move |data| {
            parse_gemini_sse(data, &mut usage)
        }))
    }

    async fn complete_with_tools(
        &self,
        req: ToolLoopRequest,
    ) -> Result<BoxStream<'static, Result<AgentMessage>>> {
        let handler = req.tool_handler.clone().ok_or_else(|| Error::Provider {
            provider: self.id.clone(),
            message: "gemini tool sessions require a tool_handler".into(),
            retriable: false,
        })?;

        let session_id = Uuid::new_v4().to_string();
        let adapter = self.clone_for_loop();
        let hook = req.permission_hook.clone();
        let tools = req.tools.clone();
        let write_enabled = req.write_enabled;
        let yolo_mode = req.yolo_mode;
        let model = req.model.clone();
        let mut messages = req.messages.clone();

        let stream = async_stream::stream! {
            for _round in 0..MAX_TOOL_ROUNDS {
                let completion = match adapter
                    .complete(CompletionRequest {
                        messages: messages.clone(),
                        model: model.clone(),
                        tools: tools.clone(),
                        ..Default::default()
                    })
                    .await
                {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                if completion.tool_calls.is_empty() {
                    yield Ok(AgentMessage {
                        message: Message::assistant(completion.content),
                        session_id: session_id.clone(),
                    });
                    return;
                }

                // Surface the assistant turn (text + tool_use parts).
                let mut parts = vec![ContentPart::Text {
                    text: completion.content.clone(),
                }];
                for tc in &completion.tool_calls {
                    parts.push(ContentPart::ToolUse {
                        id: tc.call_id.clone(),
                        name: tc.tool_name.clone(),
                        input: tc.arguments.clone(),
                    });
                }
                let assistant_msg = Message {
                    role: Role::Assistant,
                    content: MessageContent::Parts(parts),
                };
                yield Ok(AgentMessage {
                    message: assistant_msg.clone(),
                    session_id: session_id.clone(),
                });
                messages.push(assistant_msg);

                // Execute each call behind the permission protocol.
                let mut results: Vec<ToolExecutionResult> = Vec::new();
                for tc in &completion.tool_calls {
                    let decision = evaluate_tool_permission(
                        &tc.tool_name,
                        &tc.arguments,
                        write_enabled,
                        yolo_mode,
                        hook.as_deref(),
                    )
                    .await;

                    let result = if decision.is_allowed() {
                        match handler.execute(tc.clone()).await {
                            Ok(r) => r,
                            Err(e) => ToolExecutionResult {
                                tool_use_id: tc.call_id.clone(),
                                content: format!("tool error: {e}"),
                                is_error: true,
                            },
                        }
                    } else {
                        let reason = match decision {
                            crate::permissions::PermissionDecision::Deny { reason } => reason,
                            _ => unreachable!(),
                        };
                        ToolExecutionResult {
                            tool_use_id: tc.call_id.clone(),
                            content: format!("permission denied: {reason}"),
                            is_error: true,
                        }
                    };

                    fire_after_tool(hook.as_deref(), &tc.tool_name, &tc.arguments, &result.content)
                        .await;
                    results.push(result);
                }

                // Feed results back as a synthetic user turn.
                let rendered = results
                    .iter()
                    .map(|r| format!("{}: {}", r.tool_use_id, r.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(Message::user(format!(
                    "Tool execution results:\n{rendered}\n\nContinue based on these results."
                )));
            }

            yield Err(Error::Provider {
                provider: "gemini".into(),
                message: format!("tool loop exceeded {MAX_TOOL_ROUNDS} rounds"),
                retriable: false,
            });
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1beta/models?key={}", self.base_url, self.api_key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(from_reqwest)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Error::Auth(format!(
                "gemini models list returned {}",
                resp.status().as_u16()
            )))
        }
    }
}

impl GeminiAdapter {
    /// Cheap clone for moving into the tool-loop stream.
    fn clone_for_loop(&self) -> GeminiAdapter {
        GeminiAdapter {
            id: self.id.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            default_model: self.default_model.clone(),
            max_retries: self.max_retries,
            client: self.client.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text_response() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "hello"}, {"text": " world"}]},
                "finishReason": "STOP",
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2},
        });
        let result = parse_gemini_response(&body, "gemini", "gemini-2.0-flash", false);
        assert_eq!(result.content, "hello world");
        assert_eq!(result.input_tokens, 5);
        assert_eq!(result.output_tokens, 2);
        assert_eq!(result.finish_reason, FinishReason::EndTurn);
    }

    #[test]
    fn parse_function_call_sets_tool_use() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "read_file", "args": {"path": "x"}}},
                ]},
                "finishReason": "STOP",
            }],
        });
        let result = parse_gemini_response(&body, "gemini", "m", false);
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].tool_name, "read_file");
        assert_eq!(result.finish_reason, FinishReason::ToolUse);
    }

    #[test]
    fn parse_max_tokens_reason() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "partial"}]},
                "finishReason": "MAX_TOKENS",
            }],
        });
        let result = parse_gemini_response(&body, "gemini", "m", false);
        assert_eq!(result.finish_reason, FinishReason::MaxTokens);
    }

    #[test]
    fn sse_chunk_yields_content_and_done() {
        let mut usage = None;
        let events = parse_gemini_sse(
            r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":1,"candidatesTokenCount":1}}"#,
            &mut usage,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(StreamEvent::Content { .. })));
        assert!(matches!(events[1], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn json_mode_extracts_from_prose() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Sure: {\"a\": 1} there you go"}]},
                "finishReason": "STOP",
            }],
        });
        let result = parse_gemini_response(&body, "gemini", "m", true);
        let v: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(v["a"], 1);
    }
}
