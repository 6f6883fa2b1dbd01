//! Stream a completion to stdout. Ctrl-C cancels the stream via the
//! session registry; the session itself stays reusable.

use std::io::Write;

use futures_util::StreamExt;
use uuid::Uuid;

use ah_domain::completion::CompletionRequest;
use ah_domain::message::Message;
use ah_domain::stream::StreamEvent;
use ah_runner::cancellable_stream;

use crate::state::AppState;

pub async fn run(
    state: &AppState,
    prompt: &str,
    provider: &str,
    model: Option<String>,
) -> anyhow::Result<()> {
    let adapter = state
        .providers
        .get(provider)
        .ok_or_else(|| anyhow::anyhow!("unknown provider: {provider}"))?;

    let session_id = Uuid::new_v4().to_string()[..8].to_string();
    let token = state.stream_cancels.register(&session_id);

    // Ctrl-C flips the token; the stream stops accepting new chunks.
    {
        let cancels = state.stream_cancels.clone();
        let session = session_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancels.cancel_stream(&session);
            }
        });
    }

    let inner = adapter
        .stream(CompletionRequest {
            messages: vec![Message::user(prompt)],
            model,
            ..Default::default()
        })
        .await?;
    let mut stream = cancellable_stream(inner, token);

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::Content { text }) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            Ok(StreamEvent::Thinking { .. }) => {}
            Ok(StreamEvent::ToolCall { tool_name, .. }) => {
                eprintln!("\n[tool call: {tool_name}]");
            }
            Ok(StreamEvent::Done {
                usage,
                finish_reason,
            }) => {
                writeln!(stdout)?;
                if let Some(usage) = usage {
                    eprintln!(
                        "-- {} | {} tokens",
                        finish_reason.as_deref().unwrap_or("done"),
                        usage.total()
                    );
                }
                break;
            }
            Ok(StreamEvent::Error { message }) => {
                state.stream_cancels.remove(&session_id);
                anyhow::bail!("stream error: {message}");
            }
            Err(e) => {
                state.stream_cancels.remove(&session_id);
                return Err(e.into());
            }
        }
    }

    state.stream_cancels.remove(&session_id);
    Ok(())
}
