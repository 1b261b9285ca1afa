//! LLM-backed assessor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::llm::{ChatMessage, CompletionRequest, LLMClient, StopReason};

use super::{AssessmentRequest, Assessor, PromptConfig, RawModelOutput};

/// Retry behaviour for transient LLM failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `n × delay`.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

/// Sends rendered prompts to a chat model.
pub struct LlmAssessor {
    client: Arc<dyn LLMClient>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    prompts: PromptConfig,
    retry: RetryPolicy,
}

impl LlmAssessor {
    pub fn new(client: Arc<dyn LLMClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.1,
            max_tokens: 2000,
            prompts: PromptConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptConfig) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

}

#[async_trait]
impl Assessor for LlmAssessor {
    #[instrument(
        skip(self, request),
        fields(paper_id = %request.paper.id, model = %self.model, followup = request.is_followup())
    )]
    async fn assess(&self, request: AssessmentRequest<'_>) -> Result<RawModelOutput> {
        let (system, user) = self.prompts.render(&request)?;
        debug!("Built prompt ({} bytes)", user.len());

        let completion = CompletionRequest::new()
            .with_model(self.model.as_str())
            .with_system(system)
            .with_message(ChatMessage::user(user))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let mut attempt = 0;
        loop {
            match self.client.complete(completion.clone()).await {
                Ok(response) => {
                    if response.stop_reason == Some(StopReason::MaxTokens) {
                        warn!("Response truncated at {} tokens", self.max_tokens);
                    }
                    return Ok(RawModelOutput {
                        content: response.content,
                        model: Some(response.model),
                        usage: response.usage,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        "LLM call failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}
