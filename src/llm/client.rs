//! LLM client trait and provider implementations.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{
    ChatRole, CompletionRequest, CompletionResponse, Provider, StopReason, TokenUsage,
};

/// LLM client trait for making completions.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the provider for this client.
    fn provider(&self) -> Provider;
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: Option<String>,
    /// Default model
    pub default_model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let timeout = Duration::from_secs(timeout_secs);
    Client::builder()
        .timeout(timeout)
        .build()
        .or_else(|_| Client::builder().no_proxy().timeout(timeout).build())
        .map_err(|e| Error::LLM(format!("Failed to create HTTP client: {}", e)))
}

/// Classify a reqwest failure; its own timeout becomes [`Error::Timeout`].
fn transport_error(e: reqwest::Error, context: &str, timeout_secs: u64) -> Error {
    if e.is_timeout() {
        Error::timeout(timeout_secs.saturating_mul(1000))
    } else {
        Error::LLM(format!("{}: {}", context, e))
    }
}

/// Build the client for a provider.
pub fn client_for(provider: Provider, config: ClientConfig) -> Result<Arc<dyn LLMClient>> {
    Ok(match provider {
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)?),
        Provider::OpenAI | Provider::OpenRouter => {
            Arc::new(OpenAIClient::new(config)?.with_provider(provider))
        }
    })
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    config: ClientConfig,
    http: Client,
}

impl AnthropicClient {
    const API_VERSION: &'static str = "2023-06-01";
    const DEFAULT_MODEL: &'static str = "claude-3-5-haiku-20241022";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;
        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Provider::Anthropic.default_base_url())
    }
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl AnthropicClient {
    fn to_wire(&self, request: CompletionRequest) -> AnthropicRequest {
        // System messages travel in the top-level `system` field.
        let mut system = request.system;
        let mut messages = Vec::new();
        for m in request.messages {
            match m.role {
                ChatRole::System => {
                    system = Some(match system {
                        Some(s) => format!("{}\n\n{}", s, m.content),
                        None => m.content,
                    })
                }
                role => messages.push(WireMessage {
                    role: role.as_str().to_string(),
                    content: m.content,
                }),
            }
        }

        AnthropicRequest {
            model: request
                .model
                .or_else(|| self.config.default_model.clone())
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            messages,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system,
            temperature: request.temperature,
        }
    }
}

fn parse_anthropic_response(body: &str) -> Result<CompletionResponse> {
    let api_response: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| Error::LLM(format!("Failed to parse response: {}", e)))?;

    let content = api_response
        .content
        .iter()
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    let stop_reason = api_response.stop_reason.as_deref().map(|r| match r {
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    });

    Ok(CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content,
        stop_reason,
        usage: TokenUsage::new(
            api_response.usage.input_tokens,
            api_response.usage.output_tokens,
        ),
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.to_wire(request);
        let url = format!("{}/v1/messages", self.base_url());
        debug!(model = %api_request.model, "Sending Anthropic request");

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(e, "HTTP request failed", self.config.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, "Failed to read response", self.config.timeout_secs))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(Error::llm_status(
                    "anthropic",
                    status.as_u16(),
                    format!("{} ({}): {}", status, error.error.error_type, error.error.message),
                ));
            }
            return Err(Error::llm_status(
                "anthropic",
                status.as_u16(),
                format!("{}: {}", status, body),
            ));
        }

        parse_anthropic_response(&body)
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

/// OpenAI-compatible chat completions client (OpenAI, OpenRouter).
pub struct OpenAIClient {
    config: ClientConfig,
    http: Client,
    provider: Provider,
}

impl OpenAIClient {
    const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;
        Ok(Self {
            config,
            http,
            provider: Provider::OpenAI,
        })
    }

    /// Report as another OpenAI-compatible provider, using its base URL by default.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
    }

    fn to_wire(&self, request: CompletionRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.extend(request.messages.into_iter().map(|m| WireMessage {
            role: m.role.as_str().to_string(),
            content: m.content,
        }));

        OpenAIRequest {
            model: request
                .model
                .or_else(|| self.config.default_model.clone())
                .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

fn parse_openai_response(body: &str) -> Result<CompletionResponse> {
    let api_response: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| Error::LLM(format!("Failed to parse response: {}", e)))?;

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::LLM("No choices in response".to_string()))?;

    let stop_reason = choice.finish_reason.as_deref().map(|r| match r {
        "length" => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    });

    let usage = api_response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content: choice.message.content.unwrap_or_default(),
        stop_reason,
        usage,
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let api_request = self.to_wire(request);
        let url = format!("{}/v1/chat/completions", self.base_url());
        debug!(provider = %self.provider, model = %api_request.model, "Sending chat completion request");

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(e, "HTTP request failed", self.config.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, "Failed to read response", self.config.timeout_secs))?;

        if !status.is_success() {
            let provider = self.provider.to_string();
            if let Ok(error) = serde_json::from_str::<OpenAIError>(&body) {
                return Err(Error::llm_status(
                    provider,
                    status.as_u16(),
                    format!("{}: {}", status, error.error.message),
                ));
            }
            return Err(Error::llm_status(
                provider,
                status.as_u16(),
                format!("{}: {}", status, body),
            ));
        }

        parse_openai_response(&body)
    }

    fn provider(&self) -> Provider {
        self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("test-key")
            .with_base_url("https://custom.api.com")
            .with_default_model("anthropic/claude-3.5-haiku")
            .with_timeout(60);

        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, Some("https://custom.api.com".to_string()));
        assert_eq!(
            config.default_model,
            Some("anthropic/claude-3.5-haiku".to_string())
        );
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_openrouter_uses_openai_wire_format() {
        let client = OpenAIClient::new(ClientConfig::new("k").with_default_model("m"))
            .unwrap()
            .with_provider(Provider::OpenRouter);
        assert_eq!(client.base_url(), "https://openrouter.ai/api");
        assert_eq!(client.provider(), Provider::OpenRouter);

        let wire = client.to_wire(
            CompletionRequest::new()
                .with_system("sys")
                .with_message(ChatMessage::user("hello")),
        );
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_anthropic_moves_system_messages() {
        let client = AnthropicClient::new(ClientConfig::new("k")).unwrap();
        let wire = client.to_wire(
            CompletionRequest::new()
                .with_message(ChatMessage::system("rules"))
                .with_message(ChatMessage::user("paper")),
        );
        assert_eq!(wire.system.as_deref(), Some("rules"));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
        assert_eq!(wire.model, AnthropicClient::DEFAULT_MODEL);
    }

    #[test]
    fn test_parse_openai_response() {
        let body = r#"{
            "id": "gen-1",
            "model": "openai/gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "{}"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        }"#;
        let response = parse_openai_response(body).unwrap();
        assert_eq!(response.content, "{}");
        assert_eq!(response.stop_reason, Some(StopReason::MaxTokens));
        assert_eq!(response.usage, TokenUsage::new(120, 30));

        let empty = r#"{"id": "x", "model": "m", "choices": []}"#;
        assert!(parse_openai_response(empty).is_err());
    }

    #[test]
    fn test_parse_anthropic_response() {
        let body = r#"{
            "id": "msg_1",
            "model": "claude-3-5-haiku-20241022",
            "content": [{"type": "text", "text": "{\"a\": "}, {"type": "text", "text": "1}"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let response = parse_anthropic_response(body).unwrap();
        assert_eq!(response.content, "{\"a\": 1}");
        assert_eq!(response.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(response.usage.total(), 14);
    }

    #[tokio::test]
    async fn test_request_timeout_is_timeout_error() {
        // Accepts the connection but never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let config = ClientConfig::new("k").with_base_url(url).with_timeout(1);
        let client = AnthropicClient {
            http: Client::builder()
                .no_proxy()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
            config,
        };

        let err = client
            .complete(CompletionRequest::new().with_message(ChatMessage::user("paper")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { duration_ms: 1000 }));
        assert!(err.is_transient());
        drop(listener);
    }
}
