//! Anthropic Claude provider (Messages API).
//!
//! Tool calls arrive as `tool_use` content blocks and are answered with
//! `tool_result` blocks on the user side of the conversation. The API has
//! no JSON response mode; the schema instructions in the prompt carry it.

use super::{
    factory::ProviderFactory,
    secrets::{ApiKey, KeySource},
    CompletionRequest, CompletionResponse, LlmProvider, MessagePart, ProviderError, Role,
    TokenUsage, ToolCall,
};
use crate::config::ProviderSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    api_key: ApiKey,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(ApiKey::new(api_key, KeySource::Programmatic, "Anthropic API key"))
    }

    fn with_key(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `provider` config section. The key falls back to
    /// `ANTHROPIC_API_KEY`.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let key = ApiKey::resolve(settings.api_key.as_deref(), ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        let mut provider = Self::with_key(key);
        if let Some(url) = &settings.base_url {
            provider.base_url = url.trim_end_matches('/').to_string();
        }
        Ok(provider)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn build_request(request: &CompletionRequest) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| AnthropicMessage {
                role: match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: msg.parts.iter().map(ContentBlock::from_part).collect(),
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        AnthropicRequest {
            model: request.config.model.clone(),
            max_tokens: request.config.max_tokens,
            system: request.system.clone(),
            messages,
            tools,
            temperature: if request.config.temperature == 0.0 {
                None
            } else {
                Some(request.config.temperature)
            },
        }
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: JsonValue,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    fn from_part(part: &MessagePart) -> Self {
        match part {
            MessagePart::Text { text } => ContentBlock::Text { text: text.clone() },
            MessagePart::ToolCall(call) => ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            },
            MessagePart::ToolResult(result) => ContentBlock::ToolResult {
                tool_use_id: result.call_id.clone(),
                content: match &result.content {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                },
                is_error: result.is_error,
            },
        }
    }
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn into_response(body: AnthropicResponse) -> CompletionResponse {
    let parts = body
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlockResponse::Text { text } => Some(MessagePart::Text { text }),
            ContentBlockResponse::ToolUse { id, name, input } => {
                Some(MessagePart::ToolCall(ToolCall { id, name, input }))
            }
            ContentBlockResponse::Other => None,
        })
        .collect();

    CompletionResponse {
        parts,
        usage: TokenUsage {
            prompt_tokens: body.usage.input_tokens,
            completion_tokens: body.usage.output_tokens,
        },
        model: body.model,
        stop_reason: body.stop_reason,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = Self::build_request(request);
        let timeout = request.config.timeout;

        // Only expose the key here, at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        // Retry-After is not read; the invoker's backoff schedule governs
        if status == 429 {
            return Err(ProviderError::RateLimited);
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<AnthropicError>().await {
                Ok(err) => err.error.message,
                Err(e) => e.to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(into_response(body))
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_blank()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Registers `type: anthropic` with the provider registry.
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_settings(settings)?))
    }

    fn default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }
}
