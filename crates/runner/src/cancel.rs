//! Client-driven cancellation of streaming completions.
//!
//! Each streaming session registers a token; `cancel_stream(session_id)`
//! flips it and the wrapped stream stops accepting new chunks. The upstream
//! provider call is aborted best-effort when the wrapped stream is dropped.
//! The session itself stays valid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;

use ah_domain::error::Result;
use ah_domain::stream::{BoxStream, StreamEvent};

/// A cancellation flag shared between the registry and the stream wrapper.
#[derive(Clone, Default)]
pub struct StreamCancelToken {
    cancelled: Arc<AtomicBool>,
}

impl StreamCancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Active streaming sessions and their cancel tokens.
#[derive(Default)]
pub struct StreamCancelRegistry {
    tokens: Mutex<HashMap<String, StreamCancelToken>>,
}

impl StreamCancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a streaming session; returns its token.
    pub fn register(&self, session_id: &str) -> StreamCancelToken {
        let token = StreamCancelToken::new();
        self.tokens
            .lock()
            .insert(session_id.to_owned(), token.clone());
        token
    }

    /// Stop a session's stream from accepting new chunks. Returns whether
    /// an active stream was found.
    pub fn cancel_stream(&self, session_id: &str) -> bool {
        match self.tokens.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(session_id, "stream cancelled by client");
                true
            }
            None => false,
        }
    }

    /// Remove a finished session's token.
    pub fn remove(&self, session_id: &str) {
        self.tokens.lock().remove(session_id);
    }

    pub fn is_streaming(&self, session_id: &str) -> bool {
        self.tokens.lock().contains_key(session_id)
    }
}

/// Wrap a provider stream so it ends as soon as the token is cancelled.
///
/// A final `done` event with finish reason `"cancelled"` is emitted so
/// consumers can distinguish a client stop from a natural end; dropping the
/// inner stream aborts the upstream call best-effort.
pub fn cancellable_stream(
    inner: BoxStream<'static, Result<StreamEvent>>,
    token: StreamCancelToken,
) -> BoxStream<'static, Result<StreamEvent>> {
    let stream = async_stream::stream! {
        let mut inner = inner;
        while let Some(event) = inner.next().await {
            if token.is_cancelled() {
                yield Ok(StreamEvent::Done {
                    usage: None,
                    finish_reason: Some("cancelled".into()),
                });
                return;
            }
            yield event;
        }
    };
    Box::pin(stream)
}
