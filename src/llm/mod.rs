//! LLM client abstraction.
//!
//! A single chat-completion interface over Anthropic and OpenAI-compatible
//! providers (OpenAI itself and OpenRouter). Each screening engine owns one
//! client; token usage travels back on every [`CompletionResponse`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use litscreen::llm::{client_for, ClientConfig, CompletionRequest, ChatMessage, Provider};
//!
//! let client = client_for(
//!     Provider::OpenRouter,
//!     ClientConfig::new(api_key).with_default_model("anthropic/claude-3.5-haiku"),
//! )?;
//!
//! let request = CompletionRequest::new()
//!     .with_system("You are a systematic review expert evaluating research papers.")
//!     .with_message(ChatMessage::user(prompt));
//!
//! let response = client.complete(request).await?;
//! ```

mod client;
mod types;

pub use client::{client_for, AnthropicClient, ClientConfig, LLMClient, OpenAIClient};
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, Provider, StopReason,
    TokenUsage,
};
