//! Claude adapter - OAuth through the locally installed CLI.
//!
//! No API key is involved: the CLI binary holds the OAuth session and this
//! adapter drives it as a subprocess in stream-JSON mode, consuming the
//! typed event stream (system init, assistant messages with text / thinking
//! / tool-use blocks, final result with usage). The adapter refuses to
//! construct when the binary is absent.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use ah_domain::completion::{
    CacheMetrics, CompletionRequest, CompletionResult, ContainerHandle, FinishReason,
};
use ah_domain::config::ProviderConfig;
use ah_domain::error::{Error, Result};
use ah_domain::message::{ContentPart, Message, MessageContent, Role, ToolCall};
use ah_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::structured::extract_json;
use crate::traits::{AgentMessage, ProviderAdapter, ToolLoopRequest};
use crate::util::find_in_path;

const CLI_BINARY: &str = "claude";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLI event types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One line of the CLI's stream-JSON output.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliEvent {
    System {
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        message: CliAssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Incremental delta when partial messages are enabled.
    StreamEvent {
        event: Value,
    },
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        usage: Option<CliUsage>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        container: Option<CliContainer>,
        /// Structured output emitted by the native schema tool, when armed.
        #[serde(default)]
        structured_output: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct CliAssistantMessage {
    #[serde(default)]
    content: Vec<CliContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    thinking_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CliContainer {
    id: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

fn map_stop_reason(stop: Option<&str>, result_subtype: Option<&str>) -> FinishReason {
    match stop {
        Some("end_turn") => FinishReason::EndTurn,
        Some("max_tokens") => FinishReason::MaxTokens,
        Some("tool_use") => FinishReason::ToolUse,
        Some("stop_sequence") => FinishReason::StopSequence,
        _ => match result_subtype {
            Some("error_max_turns") => FinishReason::MaxTokens,
            _ => FinishReason::EndTurn,
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Claude adapter backed by the OAuth CLI.
pub struct ClaudeCliAdapter {
    id: String,
    cli_path: PathBuf,
    default_model: String,
}

impl ClaudeCliAdapter {
    /// Create the adapter from provider config.
    ///
    /// Fails with `Error::Auth` when the CLI binary is not installed -
    /// there is no API-key fallback for this provider.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let cli_path = find_in_path(CLI_BINARY).ok_or_else(|| {
            Error::Auth(
                "Claude adapter requires the claude CLI (OAuth mode only); \
                 install it and run `claude` once to authenticate"
                    .into(),
            )
        })?;

        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "claude-sonnet-4-5".into());

        tracing::info!(cli = %cli_path.display(), "claude adapter: OAuth mode");

        Ok(Self {
            id: cfg.id.clone(),
            cli_path,
            default_model,
        })
    }

    /// Map a full model id to the CLI's short alias.
    fn short_model(&self, model: Option<&str>) -> String {
        let model = model.unwrap_or(&self.default_model);
        for (needle, short) in [("opus", "opus"), ("sonnet", "sonnet"), ("haiku", "haiku")] {
            if model.contains(needle) {
                return short.to_string();
            }
        }
        model.to_string()
    }

    /// Flatten a message list into a single prompt transcript.
    ///
    /// The CLI takes one prompt per invocation; prior turns are replayed as
    /// labeled transcript lines, system content goes through
    /// `--append-system-prompt`.
    fn split_prompt(messages: &[Message]) -> (Option<String>, String) {
        let mut system_parts: Vec<String> = Vec::new();
        let mut transcript: Vec<String> = Vec::new();

        for msg in messages {
            let text = msg.content.extract_all_text();
            match msg.role {
                Role::System => system_parts.push(text),
                Role::User => transcript.push(text),
                Role::Assistant => transcript.push(format!("[Previous assistant reply]\n{text}")),
                Role::Tool => transcript.push(format!("[Tool output]\n{text}")),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, transcript.join("\n\n"))
    }

    fn base_command(&self, req: &CompletionRequest) -> Command {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--model")
            .arg(self.short_model(req.model.as_deref()));

        if let Some(level) = req.thinking_level {
            match level.claude_budget_tokens() {
                Some(budget) => {
                    cmd.arg("--max-thinking-tokens").arg(budget.to_string());
                }
                None => {
                    cmd.arg("--max-thinking-tokens").arg("0");
                }
            }
        }

        if let Some(max_tokens) = req.max_tokens {
            cmd.env("CLAUDE_CODE_MAX_OUTPUT_TOKENS", max_tokens.to_string());
        }

        if req.enable_programmatic_tools {
            cmd.arg("--allowed-tools").arg("Bash,Read,Write");
        } else {
            // Plain completion: no tool round-trips.
            cmd.arg("--max-turns").arg("1");
        }

        if let Some(ref container_id) = req.container_id {
            cmd.arg("--resume").arg(container_id);
        }
        if let Some(ref dir) = req.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Spawn the CLI, feed the prompt, and hand back a line reader.
    async fn spawn(
        &self,
        mut cmd: Command,
        system: Option<String>,
        prompt: String,
    ) -> Result<(tokio::process::Child, BufReader<tokio::process::ChildStdout>)> {
        if let Some(ref sys) = system {
            cmd.arg("--append-system-prompt").arg(sys);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Provider {
                provider: self.id.clone(),
                message: format!("failed to spawn claude CLI: {e}"),
                retriable: false,
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| Error::Provider {
            provider: self.id.clone(),
            message: "claude CLI stdin unavailable".into(),
            retriable: false,
        })?;
        stdin.write_all(prompt.as_bytes()).await?;
        drop(stdin);

        let stdout = child.stdout.take().ok_or_else(|| Error::Provider {
            provider: self.id.clone(),
            message: "claude CLI stdout unavailable".into(),
            retriable: false,
        })?;

        Ok((child, BufReader::new(stdout)))
    }
}

/// Accumulates CLI events into a [`CompletionResult`].
#[derive(Default)]
struct Collector {
    text_parts: Vec<String>,
    thinking_parts: Vec<String>,
    tool_calls: Vec<ToolCall>,
    stop_reason: Option<String>,
    result_subtype: Option<String>,
    usage: Option<CliUsage>,
    session_id: Option<String>,
    container: Option<CliContainer>,
    structured_output: Option<Value>,
}

impl Collector {
    fn absorb(&mut self, event: CliEvent) {
        match event {
            CliEvent::System { session_id } => {
                if session_id.is_some() {
                    self.session_id = session_id;
                }
            }
            CliEvent::Assistant {
                message,
                session_id,
            } => {
                if session_id.is_some() {
                    self.session_id = session_id;
                }
                if message.stop_reason.is_some() {
                    self.stop_reason = message.stop_reason;
                }
                for block in message.content {
                    match block {
                        CliContentBlock::Text { text } => self.text_parts.push(text),
                        CliContentBlock::Thinking { thinking } => {
                            self.thinking_parts.push(thinking)
                        }
                        CliContentBlock::ToolUse { id, name, input } => {
                            self.tool_calls.push(ToolCall {
                                call_id: id,
                                tool_name: name,
                                arguments: input,
                            })
                        }
                        CliContentBlock::Other => {}
                    }
                }
            }
            CliEvent::Result {
                subtype,
                result,
                usage,
                session_id,
                container,
                structured_output,
            } => {
                self.result_subtype = subtype;
                if self.text_parts.is_empty() {
                    if let Some(r) = result {
                        self.text_parts.push(r);
                    }
                }
                self.usage = usage;
                if session_id.is_some() {
                    self.session_id = session_id;
                }
                self.container = container;
                self.structured_output = structured_output;
            }
            CliEvent::StreamEvent { .. } | CliEvent::Unknown => {}
        }
    }

    fn into_result(self, provider: &str, model: String, req: &CompletionRequest) -> CompletionResult {
        let mut content = self.text_parts.join("");

        // Structured output: prefer the native schema tool's emission, fall
        // back to scanning the text for JSON.
        if let Some(ref rf) = req.response_format {
            if rf.format_type == "json_object" {
                if let Some(native) = self.structured_output {
                    content = native.to_string();
                } else if let Some(found) = extract_json(&content) {
                    content = found.to_string();
                }
            }
        }

        let usage = self.usage.unwrap_or(CliUsage {
            input_tokens: 0,
            output_tokens: 0,
            thinking_tokens: 0,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        });

        let finish_reason = if !self.tool_calls.is_empty()
            && self.stop_reason.as_deref() == Some("tool_use")
        {
            FinishReason::ToolUse
        } else {
            map_stop_reason(self.stop_reason.as_deref(), self.result_subtype.as_deref())
        };

        CompletionResult {
            content,
            model,
            provider: provider.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            finish_reason,
            thinking_content: if self.thinking_parts.is_empty() {
                None
            } else {
                Some(self.thinking_parts.join("\n"))
            },
            thinking_tokens: if usage.thinking_tokens > 0 {
                Some(usage.thinking_tokens)
            } else {
                None
            },
            tool_calls: self.tool_calls,
            container: self.container.map(|c| ContainerHandle {
                id: c.id,
                expires_at: c.expires_at,
            }),
            cache_metrics: Some(CacheMetrics {
                cache_creation_input_tokens: usage.cache_creation_input_tokens,
                cache_read_input_tokens: usage.cache_read_input_tokens,
            }),
        }
    }
}

/// Pull text deltas out of a partial-message stream event.
fn delta_text(event: &Value) -> Option<(&'static str, String)> {
    let delta = event.get("delta")?;
    match delta.get("type").and_then(Value::as_str)? {
        "text_delta" => delta
            .get("text")
            .and_then(Value::as_str)
            .map(|t| ("content", t.to_string())),
        "thinking_delta" => delta
            .get("thinking")
            .and_then(Value::as_str)
            .map(|t| ("thinking", t.to_string())),
        _ => None,
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeCliAdapter {
    fn name(&self) -> &str {
        &self.id
    }

    fn auth_mode(&self) -> &str {
        "oauth"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResult> {
        let (mut system, prompt) = Self::split_prompt(&req.messages);

        if let Some(ref rf) = req.response_format {
            if let Some(ref schema) = rf.schema {
                let instruction = format!(
                    "Respond ONLY with a JSON value matching this schema:\n{schema}"
                );
                system = Some(match system {
                    Some(s) => format!("{s}\n\n{instruction}"),
                    None => instruction,
                });
            }
        }

        let cmd = self.base_command(&req);
        let (mut child, reader) = self.spawn(cmd, system, prompt).await?;

        let mut collector = Collector::default();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CliEvent>(&line) {
                Ok(event) => collector.absorb(event),
                Err(e) => tracing::debug!(error = %e, "skipping unparseable CLI line"),
            }
        }

        let status = child.wait().await?;
        if !status.success() && collector.text_parts.is_empty() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("claude CLI exited with {status}"),
                retriable: false,
            });
        }

        let model = self.short_model(req.model.as_deref());
        Ok(collector.into_result(&self.id, model, &req))
    }

    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let (system, prompt) = Self::split_prompt(&req.messages);
        let mut cmd = self.base_command(&req);
        cmd.arg("--include-partial-messages");

        let (mut child, reader) = self.spawn(cmd, system, prompt).await?;

        let stream = async_stream::stream! {
            let mut lines = reader.lines();
            let mut done_emitted = false;
            let mut usage: Option<Usage> = None;

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(Error::Io(e));
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let event = match serde_json::from_str::<CliEvent>(&line) {
                    Ok(event) => event,
                    Err(_) => continue,
                };

                match event {
                    CliEvent::StreamEvent { event } => {
                        if let Some((kind, text)) = delta_text(&event) {
                            if kind == "content" {
                                yield Ok(StreamEvent::Content { text });
                            } else {
                                yield Ok(StreamEvent::Thinking { text });
                            }
                        }
                    }
                    CliEvent::Assistant { message, .. } => {
                        for block in message.content {
                            if let CliContentBlock::ToolUse { id, name, input } = block {
                                yield Ok(StreamEvent::ToolCall {
                                    call_id: id,
                                    tool_name: name,
                                    arguments: input,
                                });
                            }
                        }
                    }
                    CliEvent::Result { usage: u, subtype, .. } => {
                        if let Some(u) = u {
                            usage = Some(Usage {
                                input_tokens: u.input_tokens,
                                output_tokens: u.output_tokens,
                                thinking_tokens: u.thinking_tokens,
                            });
                        }
                        done_emitted = true;
                        let finish = match subtype.as_deref() {
                            Some("error_max_turns") => "max_tokens",
                            _ => "end_turn",
                        };
                        yield Ok(StreamEvent::Done {
                            usage: usage.clone(),
                            finish_reason: Some(finish.into()),
                        });
                    }
                    _ => {}
                }
            }

            let _ = child.wait().await;
            if !done_emitted {
                yield Ok(StreamEvent::Done {
                    usage,
                    finish_reason: Some("end_turn".into()),
                });
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete_with_tools(
        &self,
        req: ToolLoopRequest,
    ) -> Result<BoxStream<'static, Result<AgentMessage>>> {
        let (system, prompt) = Self::split_prompt(&req.messages);

        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--model")
            .arg(self.short_model(req.model.as_deref()));

        // The CLI's own sandbox runs the tools; write access maps onto its
        // permission modes.
        let permission_mode = if req.yolo_mode {
            "bypassPermissions"
        } else if req.write_enabled {
            "acceptEdits"
        } else {
            "plan"
        };
        cmd.arg("--permission-mode").arg(permission_mode);

        if let Some(ref dir) = req.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let provider_id = self.id.clone();
        let (mut child, reader) = self.spawn(cmd, system, prompt).await?;

        let stream = async_stream::stream! {
            let mut lines = reader.lines();
            let mut session_id = String::new();

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(Error::Io(e));
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let event = match serde_json::from_str::<CliEvent>(&line) {
                    Ok(event) => event,
                    Err(_) => continue,
                };

                match event {
                    CliEvent::System { session_id: sid } => {
                        if let Some(sid) = sid {
                            session_id = sid;
                        }
                    }
                    CliEvent::Assistant { message, session_id: sid } => {
                        if let Some(sid) = sid {
                            session_id = sid;
                        }
                        let mut parts: Vec<ContentPart> = Vec::new();
                        for block in message.content {
                            match block {
                                CliContentBlock::Text { text } => {
                                    parts.push(ContentPart::Text { text })
                                }
                                CliContentBlock::Thinking { thinking } => {
                                    parts.push(ContentPart::Thinking { text: thinking })
                                }
                                CliContentBlock::ToolUse { id, name, input } => {
                                    parts.push(ContentPart::ToolUse { id, name, input })
                                }
                                CliContentBlock::Other => {}
                            }
                        }
                        yield Ok(AgentMessage {
                            message: Message {
                                role: Role::Assistant,
                                content: MessageContent::Parts(parts),
                            },
                            session_id: session_id.clone(),
                        });
                    }
                    CliEvent::Result { result, session_id: sid, .. } => {
                        if let Some(sid) = sid {
                            session_id = sid;
                        }
                        if let Some(text) = result {
                            yield Ok(AgentMessage {
                                message: Message::assistant(text),
                                session_id: session_id.clone(),
                            });
                        }
                        break;
                    }
                    _ => {}
                }
            }

            if let Err(e) = child.wait().await {
                tracing::warn!(provider = %provider_id, error = %e, "claude CLI wait failed");
            }
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.cli_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| Error::Auth(format!("claude CLI not runnable: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Auth("claude CLI --version failed".into()))
        }
    }
}
