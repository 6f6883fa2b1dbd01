//! Roundtable - a bounded, session-bound multi-agent conversation.
//!
//! Claude and Gemini collaborate on a shared transcript. Within a volley
//! speakers respond strictly sequentially and the second speaker sees the
//! first's output; the speaker order for `both` is randomized per volley to
//! prevent positional bias. Memory context is fetched once at session
//! creation and embedded in every per-agent system prompt. A dropped event
//! stream (client disconnect) discards the partial message but leaves the
//! session valid - transcripts only grow on completed messages.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use ah_domain::completion::CompletionRequest;
use ah_domain::error::{Error, Result};
use ah_domain::message::Message;
use ah_domain::scope::MemoryScope;
use ah_domain::stream::{BoxStream, StreamEvent};
use ah_memory::injector::{ContextInjector, InjectionRequest};
use ah_memory::variants::{get_variant_config, MemoryVariant};
use ah_providers::registry::ProviderRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundtableAgent {
    Claude,
    Gemini,
}

impl RoundtableAgent {
    pub fn as_str(self) -> &'static str {
        match self {
            RoundtableAgent::Claude => "claude",
            RoundtableAgent::Gemini => "gemini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RoundtableAgent::Claude => "Claude",
            RoundtableAgent::Gemini => "Gemini",
        }
    }

    pub fn other(self) -> RoundtableAgent {
        match self {
            RoundtableAgent::Claude => RoundtableAgent::Gemini,
            RoundtableAgent::Gemini => RoundtableAgent::Claude,
        }
    }
}

/// Which agent(s) a message targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Claude,
    Gemini,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundtableMode {
    Quick,
    Deliberation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundtableRole {
    User,
    Claude,
    Gemini,
    System,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundtableMessage {
    pub id: String,
    pub role: RoundtableRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tokens_used: u64,
    pub model: Option<String>,
}

impl RoundtableMessage {
    fn new(role: RoundtableRole, content: String, tokens_used: u64, model: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            role,
            content,
            timestamp: Utc::now(),
            tokens_used,
            model,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundtableSession {
    pub id: String,
    pub project_id: String,
    pub mode: RoundtableMode,
    pub tools_enabled: bool,
    pub messages: Vec<RoundtableMessage>,
    pub created_at: DateTime<Utc>,
    /// Pre-fetched memory context, embedded into agent system prompts.
    pub memory_context: String,
}

impl RoundtableSession {
    /// Format the recent transcript for a speaker's prompt.
    pub fn context_window(&self, max_messages: usize) -> String {
        let start = self.messages.len().saturating_sub(max_messages);
        self.messages[start..]
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    RoundtableRole::User => "USER",
                    RoundtableRole::Claude => "CLAUDE",
                    RoundtableRole::Gemini => "GEMINI",
                    RoundtableRole::System => "SYSTEM",
                };
                format!("[{speaker}]: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn total_tokens(&self) -> u64 {
        self.messages.iter().map(|m| m.tokens_used).sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streamed roundtable events. An empty-content `Message` with non-zero
/// `tokens` signals that an agent's message is complete.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundtableEvent {
    Message {
        agent: RoundtableAgent,
        content: String,
        tokens: u64,
    },
    Thinking {
        agent: RoundtableAgent,
        content: String,
    },
    ToolCall {
        agent: RoundtableAgent,
        tool_name: String,
    },
    Error {
        agent: Option<RoundtableAgent>,
        error: String,
    },
    VolleyComplete,
    Done,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RoundtableService {
    providers: Arc<ProviderRegistry>,
    injector: Option<Arc<ContextInjector>>,
    sessions: Mutex<HashMap<String, Arc<Mutex<RoundtableSession>>>>,
    context_messages: usize,
    max_rounds: u32,
}

impl RoundtableService {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        injector: Option<Arc<ContextInjector>>,
        context_messages: usize,
        max_rounds: u32,
    ) -> Self {
        Self {
            providers,
            injector,
            sessions: Mutex::new(HashMap::new()),
            context_messages,
            max_rounds,
        }
    }

    /// Create a session with one-time memory injection.
    pub async fn create_session(
        &self,
        project_id: &str,
        mode: RoundtableMode,
        tools_enabled: bool,
        use_memory: bool,
    ) -> RoundtableSession {
        let memory_context = if use_memory {
            self.fetch_memory_context(project_id).await
        } else {
            String::new()
        };

        let session = RoundtableSession {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            project_id: project_id.to_string(),
            mode,
            tools_enabled,
            messages: Vec::new(),
            created_at: Utc::now(),
            memory_context,
        };

        tracing::info!(session_id = %session.id, ?mode, "created roundtable session");
        self.sessions
            .lock()
            .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
        session
    }

    async fn fetch_memory_context(&self, project_id: &str) -> String {
        let Some(ref injector) = self.injector else {
            return String::new();
        };
        let request = InjectionRequest {
            query: format!("collaboration context for project {project_id}"),
            scope: MemoryScope::Global,
            scope_id: None,
            task_type: None,
            session_id: None,
            external_id: Some(format!("roundtable:{project_id}")),
        };
        match injector
            .render(&request, &get_variant_config(MemoryVariant::Baseline))
            .await
        {
            Ok((_, formatted)) => {
                if !formatted.is_empty() {
                    tracing::info!(
                        chars = formatted.len(),
                        "injected memory context into roundtable session"
                    );
                }
                formatted
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch roundtable memory context");
                String::new()
            }
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<RoundtableSession> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.lock().clone())
    }

    /// Route a user message to the targeted agent(s), streaming events.
    pub fn route_message(
        &self,
        session_id: &str,
        user_message: &str,
        target: Target,
    ) -> Result<BoxStream<'static, RoundtableEvent>> {
        self.volley(session_id, Some(user_message.to_string()), target)
    }

    /// Run another volley without new user input (the "continue" command).
    pub fn continue_volley(
        &self,
        session_id: &str,
        target: Target,
    ) -> Result<BoxStream<'static, RoundtableEvent>> {
        self.volley(session_id, None, target)
    }

    fn volley(
        &self,
        session_id: &str,
        user_message: Option<String>,
        target: Target,
    ) -> Result<BoxStream<'static, RoundtableEvent>> {
        let session = self
            .sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::Other(format!("unknown roundtable session: {session_id}")))?;

        let providers = self.providers.clone();
        let context_messages = self.context_messages;
        let order = speaker_order(target);

        let stream = async_stream::stream! {
            let prompt_seed = match user_message {
                Some(message) => {
                    session.lock().messages.push(RoundtableMessage::new(
                        RoundtableRole::User,
                        message.clone(),
                        0,
                        None,
                    ));
                    message
                }
                // Continue without new input; the framing is cosmetic.
                None => "Continue the discussion - respond to the other \
                         participant's latest points."
                    .to_string(),
            };

            for agent in order {
                let events = stream_agent(
                    providers.clone(),
                    session.clone(),
                    agent,
                    prompt_seed.clone(),
                    context_messages,
                )
                .await;
                let mut events = std::pin::pin!(events);
                while let Some(event) = events.next().await {
                    yield event;
                }
            }

            yield RoundtableEvent::VolleyComplete;
            yield RoundtableEvent::Done;
        };

        Ok(Box::pin(stream))
    }

    /// Deliberation: an opening volley to both agents, alternating
    /// follow-up rounds, and a closing consensus request.
    pub fn deliberate(
        &self,
        session_id: &str,
        topic: &str,
    ) -> Result<BoxStream<'static, RoundtableEvent>> {
        let session = self
            .sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::Other(format!("unknown roundtable session: {session_id}")))?;

        let providers = self.providers.clone();
        let context_messages = self.context_messages;
        let max_rounds = self.max_rounds;
        let topic = topic.to_string();

        let stream = async_stream::stream! {
            session.lock().messages.push(RoundtableMessage::new(
                RoundtableRole::User,
                topic.clone(),
                0,
                None,
            ));

            // Opening volley.
            let mut order = speaker_order(Target::Both);
            for agent in order.clone() {
                let events = stream_agent(
                    providers.clone(),
                    session.clone(),
                    agent,
                    topic.clone(),
                    context_messages,
                )
                .await;
                let mut events = std::pin::pin!(events);
                while let Some(event) = events.next().await {
                    yield event;
                }
            }
            yield RoundtableEvent::VolleyComplete;

            // Back-and-forth rounds, alternating who opens.
            for round in 1..max_rounds {
                order.rotate_left(1);
                let prompt = format!(
                    "Round {}: respond to the other participant's points.",
                    round + 1
                );
                for agent in order.clone() {
                    let events = stream_agent(
                        providers.clone(),
                        session.clone(),
                        agent,
                        prompt.clone(),
                        context_messages,
                    )
                    .await;
                    let mut events = std::pin::pin!(events);
                    while let Some(event) = events.next().await {
                        yield event;
                    }
                }
                yield RoundtableEvent::VolleyComplete;
            }

            // Consensus close.
            let consensus = "State your final position and the points of \
                             consensus reached in this discussion.";
            for agent in order {
                let events = stream_agent(
                    providers.clone(),
                    session.clone(),
                    agent,
                    consensus.to_string(),
                    context_messages,
                )
                .await;
                let mut events = std::pin::pin!(events);
                while let Some(event) = events.next().await {
                    yield event;
                }
            }
            yield RoundtableEvent::VolleyComplete;
            yield RoundtableEvent::Done;
        };

        Ok(Box::pin(stream))
    }
}

/// Speaker order for a volley. `both` is randomized per volley so neither
/// agent systematically speaks first.
fn speaker_order(target: Target) -> Vec<RoundtableAgent> {
    match target {
        Target::Claude => vec![RoundtableAgent::Claude],
        Target::Gemini => vec![RoundtableAgent::Gemini],
        Target::Both => {
            if Uuid::new_v4().as_bytes()[0] % 2 == 0 {
                vec![RoundtableAgent::Claude, RoundtableAgent::Gemini]
            } else {
                vec![RoundtableAgent::Gemini, RoundtableAgent::Claude]
            }
        }
    }
}

fn build_system_prompt(agent: RoundtableAgent, memory_context: &str) -> String {
    let base = format!(
        "You are {}, participating in a collaborative roundtable discussion. \
         Other agents may also respond; consider their input when relevant. \
         Be concise but thorough.",
        agent.display_name()
    );
    if memory_context.is_empty() {
        base
    } else {
        format!("{base}\n\n{memory_context}")
    }
}

fn build_user_prompt(agent: RoundtableAgent, message: &str, context: &str) -> String {
    if context.is_empty() {
        return message.to_string();
    }
    format!(
        "Previous conversation:\n{context}\n\n\
         {} may have already responded above. Consider their input if relevant.\n\n\
         User's message: {message}",
        agent.other().display_name()
    )
}

/// Stream one agent's turn. The completed message is appended to the
/// session only when the provider signals `done` - a dropped stream leaves
/// the transcript untouched.
async fn stream_agent(
    providers: Arc<ProviderRegistry>,
    session: Arc<Mutex<RoundtableSession>>,
    agent: RoundtableAgent,
    message: String,
    context_messages: usize,
) -> BoxStream<'static, RoundtableEvent> {
    let (system, prompt, model) = {
        let session = session.lock();
        let context = session.context_window(context_messages);
        (
            build_system_prompt(agent, &session.memory_context),
            build_user_prompt(agent, &message, &context),
            None::<String>,
        )
    };

    let Some(adapter) = providers.get(agent.as_str()) else {
        return Box::pin(futures_util::stream::iter(vec![RoundtableEvent::Error {
            agent: Some(agent),
            error: format!("provider {} not registered", agent.as_str()),
        }]));
    };

    let request = CompletionRequest {
        messages: vec![Message::system(system), Message::user(prompt)],
        model,
        ..Default::default()
    };

    let stream = async_stream::stream! {
        let mut provider_stream = match adapter.stream(request).await {
            Ok(s) => s,
            Err(e) => {
                yield RoundtableEvent::Error {
                    agent: Some(agent),
                    error: e.to_string(),
                };
                return;
            }
        };

        let mut content_parts: Vec<String> = Vec::new();

        while let Some(event) = provider_stream.next().await {
            match event {
                Ok(StreamEvent::Content { text }) => {
                    content_parts.push(text.clone());
                    yield RoundtableEvent::Message {
                        agent,
                        content: text,
                        tokens: 0,
                    };
                }
                Ok(StreamEvent::Thinking { text }) => {
                    yield RoundtableEvent::Thinking {
                        agent,
                        content: text,
                    };
                }
                Ok(StreamEvent::ToolCall { tool_name, .. }) => {
                    yield RoundtableEvent::ToolCall { agent, tool_name };
                }
                Ok(StreamEvent::Done { usage, .. }) => {
                    let full = content_parts.join("");
                    let tokens = usage.map(|u| u.total() as u64).unwrap_or(0);

                    let role = match agent {
                        RoundtableAgent::Claude => RoundtableRole::Claude,
                        RoundtableAgent::Gemini => RoundtableRole::Gemini,
                    };
                    session
                        .lock()
                        .messages
                        .push(RoundtableMessage::new(role, full, tokens, None));

                    // Completion signal: empty content, non-zero tokens.
                    yield RoundtableEvent::Message {
                        agent,
                        content: String::new(),
                        tokens: tokens.max(1),
                    };
                    return;
                }
                Ok(StreamEvent::Error { message }) => {
                    yield RoundtableEvent::Error {
                        agent: Some(agent),
                        error: message,
                    };
                    return;
                }
                Err(e) => {
                    yield RoundtableEvent::Error {
                        agent: Some(agent),
                        error: e.to_string(),
                    };
                    return;
                }
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_window_takes_recent_messages() {
        let mut session = RoundtableSession {
            id: "s".into(),
            project_id: "p".into(),
            mode: RoundtableMode::Quick,
            tools_enabled: false,
            messages: Vec::new(),
            created_at: Utc::now(),
            memory_context: String::new(),
        };
        for i in 0..30 {
            session.messages.push(RoundtableMessage::new(
                RoundtableRole::User,
                format!("msg {i}"),
                0,
                None,
            ));
        }

        let window = session.context_window(20);
        assert!(!window.contains("msg 9"));
        assert!(window.contains("msg 10"));
        assert!(window.contains("msg 29"));
    }

    #[test]
    fn system_prompt_embeds_memory_context() {
        let with = build_system_prompt(RoundtableAgent::Claude, "## Mandates\nrule");
        assert!(with.contains("You are Claude"));
        assert!(with.contains("## Mandates"));

        let without = build_system_prompt(RoundtableAgent::Gemini, "");
        assert!(without.contains("You are Gemini"));
        assert!(!without.contains("\n\n"));
    }

    #[test]
    fn user_prompt_names_the_other_agent() {
        let prompt = build_user_prompt(RoundtableAgent::Claude, "hello", "[USER]: hi");
        assert!(prompt.contains("Gemini may have already responded"));
        let bare = build_user_prompt(RoundtableAgent::Gemini, "hello", "");
        assert_eq!(bare, "hello");
    }

    #[test]
    fn speaker_order_single_targets_fixed() {
        assert_eq!(
            speaker_order(Target::Claude),
            vec![RoundtableAgent::Claude]
        );
        assert_eq!(
            speaker_order(Target::Gemini),
            vec![RoundtableAgent::Gemini]
        );
    }

    #[test]
    fn speaker_order_both_covers_both_orders() {
        let mut saw_claude_first = false;
        let mut saw_gemini_first = false;
        for _ in 0..200 {
            match speaker_order(Target::Both)[0] {
                RoundtableAgent::Claude => saw_claude_first = true,
                RoundtableAgent::Gemini => saw_gemini_first = true,
            }
            if saw_claude_first && saw_gemini_first {
                break;
            }
        }
        assert!(saw_claude_first && saw_gemini_first);
    }

    #[test]
    fn total_tokens_sums_messages() {
        let mut session = RoundtableSession {
            id: "s".into(),
            project_id: "p".into(),
            mode: RoundtableMode::Deliberation,
            tools_enabled: true,
            messages: Vec::new(),
            created_at: Utc::now(),
            memory_context: String::new(),
        };
        session
            .messages
            .push(RoundtableMessage::new(RoundtableRole::Claude, "a".into(), 20, None));
        session
            .messages
            .push(RoundtableMessage::new(RoundtableRole::Gemini, "b".into(), 30, None));
        assert_eq!(session.total_tokens(), 50);
    }
}
