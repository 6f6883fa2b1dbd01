//! Shared test doubles for this crate's suites.

use async_trait::async_trait;
use parking_lot::Mutex;

use ah_domain::completion::{CompletionRequest, CompletionResult, FinishReason};
use ah_domain::error::{Error, Result};
use ah_domain::stream::{BoxStream, StreamEvent};
use ah_providers::{AgentMessage, ProviderAdapter, ToolLoopRequest};

/// Provider double that pops canned responses in order, then repeats the
/// last one. Records every prompt it saw.
pub struct FakeAdapter {
    responses: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeAdapter {
    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn name(&self) -> &str {
        "fake"
    }

    fn auth_mode(&self) -> &str {
        "none"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResult> {
        let prompt = req
            .messages
            .iter()
            .map(|m| m.content.extract_all_text())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().push(prompt);

        let mut responses = self.responses.lock();
        let content = if responses.len() > 1 {
            responses.pop().unwrap()
        } else {
            responses.last().cloned().unwrap_or_default()
        };

        Ok(CompletionResult {
            content,
            model: "fake-model".into(),
            provider: "fake".into(),
            input_tokens: 10,
            output_tokens: 10,
            finish_reason: FinishReason::EndTurn,
            thinking_content: None,
            thinking_tokens: None,
            tool_calls: Vec::new(),
            container: None,
            cache_metrics: None,
        })
    }

    async fn stream(
        &self,
        _req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        Err(Error::Other("fake adapter does not stream".into()))
    }

    async fn complete_with_tools(
        &self,
        _req: ToolLoopRequest,
    ) -> Result<BoxStream<'static, Result<AgentMessage>>> {
        Err(Error::Other("fake adapter has no tool loop".into()))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
