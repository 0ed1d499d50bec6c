//! LLM provider abstractions for veritrace-runtime.
//!
//! This module defines the trait for generative backends and includes
//! implementations for Anthropic and Gemini behind cargo features.
//!
//! Messages are sequences of parts so that tool calls and tool results can
//! round-trip through any backend without the caller managing wire formats.
//!
//! API keys are held as [`ApiKey`] and never appear in `Debug` output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "gemini")]
mod gemini;

pub use factory::{Backend, ProviderFactory, ProviderRegistry};
pub use secrets::{ApiKey, KeySource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory, ANTHROPIC_API_KEY_ENV};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory, GEMINI_API_KEY_ENV};

/// Errors from LLM providers.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the failure is transient throttling worth retrying.
    ///
    /// Rate limits and quota exhaustion are retried; everything else is
    /// terminal for the call.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited => true,
            ProviderError::ApiError { status, message } => {
                *status == 429 || mentions_throttling(message)
            }
            ProviderError::HttpError(message) => mentions_throttling(message),
            _ => false,
        }
    }
}

fn mentions_throttling(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("429")
        || lowered.contains("quota")
        || lowered.contains("rate limit")
        || lowered.contains("resource exhausted")
        || lowered.contains("resource_exhausted")
}

/// Configuration for a completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation requested by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned id, echoed back in the result
    pub id: String,
    pub name: String,
    pub input: JsonValue,
}

/// The outcome of a tool invocation, sent back to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: JsonValue,
    #[serde(default)]
    pub is_error: bool,
}

/// One piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::Text {
                text: content.into(),
            }],
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![MessagePart::Text {
                text: content.into(),
            }],
        }
    }

    /// Echo a backend reply back into the conversation.
    pub fn assistant_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// Tool results, sent on the user side of the conversation.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            parts: results.into_iter().map(MessagePart::ToolResult).collect(),
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        collect_text(&self.parts)
    }
}

fn collect_text(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// A tool the backend may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool input
    pub input_schema: JsonValue,
}

/// Everything a backend needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instruction
    pub system: Option<String>,

    pub messages: Vec<ChatMessage>,

    /// Tools declared for this call
    pub tools: Vec<ToolDefinition>,

    /// Ask the backend for a machine-parseable reply where it supports it
    pub json_mode: bool,

    pub config: CompletionConfig,
}

impl CompletionRequest {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            system: None,
            messages: Vec::new(),
            tools: Vec::new(),
            json_mode: false,
            config,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Generated content, text and tool calls in backend order
    pub parts: Vec<MessagePart>,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

impl CompletionResponse {
    /// A plain text reply.
    pub fn text_reply(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            parts: vec![MessagePart::Text { text: text.into() }],
            usage: TokenUsage::default(),
            model: model.into(),
            stop_reason: Some("end_turn".to_string()),
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        collect_text(&self.parts)
    }

    /// Tool calls requested by the backend.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, MessagePart::ToolCall(_)))
    }
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// Only the invoker calls this. Tool dispatch and retries happen above the
/// provider; a provider performs exactly one HTTP round per call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is healthy.
    async fn health_check(&self) -> bool;

    /// Get provider name for metrics.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Simple estimate: ~4 chars per token
        (text.len() / 4) as u32
    }
}
