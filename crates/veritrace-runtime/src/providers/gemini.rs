//! Google Gemini provider (generateContent API).
//!
//! Tool calls arrive as `functionCall` parts and are answered with
//! `functionResponse` parts. Gemini assigns no call ids, so ids are
//! synthesized per response and results are matched back by function name.

use super::{
    factory::ProviderFactory,
    secrets::{ApiKey, KeySource},
    CompletionRequest, CompletionResponse, LlmProvider, MessagePart, ProviderError, Role,
    TokenUsage, ToolCall,
};
use crate::config::ProviderSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// Environment variable name for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Google Gemini provider.
pub struct GeminiProvider {
    api_key: ApiKey,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_key(ApiKey::new(api_key, KeySource::Programmatic, "Gemini API key"))
    }

    fn with_key(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `provider` config section. The key falls back to
    /// `GEMINI_API_KEY`.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let key = ApiKey::resolve(settings.api_key.as_deref(), GEMINI_API_KEY_ENV, "Gemini API key")?;
        let mut provider = Self::with_key(key);
        if let Some(url) = &settings.base_url {
            provider.base_url = url.trim_end_matches('/').to_string();
        }
        Ok(provider)
    }

    fn build_request(request: &CompletionRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .map(|msg| GeminiContent {
                role: match msg.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "model".to_string(),
                },
                parts: msg.parts.iter().map(GeminiPart::from_part).collect(),
            })
            .collect();

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    })
                    .collect(),
            }]
        };

        // JSON response mode cannot be combined with function calling
        let response_mime_type = (request.json_mode && request.tools.is_empty())
            .then(|| "application/json".to_string());

        GeminiRequest {
            system_instruction: request.system.as_ref().map(|text| GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart::text(text.clone())],
            }),
            contents,
            tools,
            generation_config: GenerationConfig {
                max_output_tokens: request.config.max_tokens,
                temperature: request.config.temperature,
                response_mime_type,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    fn from_part(part: &MessagePart) -> Self {
        match part {
            MessagePart::Text { text } => Self::text(text.clone()),
            MessagePart::ToolCall(call) => Self {
                function_call: Some(FunctionCall {
                    name: call.name.clone(),
                    args: call.input.clone(),
                }),
                ..Self::default()
            },
            MessagePart::ToolResult(result) => {
                // The response payload must be an object
                let response = match (&result.content, result.is_error) {
                    (content, true) => json!({ "error": content }),
                    (JsonValue::Object(_), false) => result.content.clone(),
                    (content, false) => json!({ "result": content }),
                };
                Self {
                    function_response: Some(FunctionResponse {
                        name: result.name.clone(),
                        response,
                    }),
                    ..Self::default()
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: JsonValue,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn into_response(body: GeminiResponse, requested_model: &str) -> Result<CompletionResponse, ProviderError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response has no candidates".to_string()))?;

    let mut parts = Vec::new();
    let mut call_index = 0;
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            parts.push(MessagePart::Text { text });
        }
        if let Some(call) = part.function_call {
            parts.push(MessagePart::ToolCall(ToolCall {
                id: format!("call_{}", call_index),
                name: call.name,
                input: call.args,
            }));
            call_index += 1;
        }
    }

    let usage = body
        .usage_metadata
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        parts,
        usage,
        model: body
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        stop_reason: candidate.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = Self::build_request(request);
        let timeout = request.config.timeout;
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.config.model
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose())
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

        if status == 429 {
            return Err(ProviderError::RateLimited);
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<GeminiError>().await {
                Ok(err) => match err.error.status {
                    Some(code) => format!("{}: {}", code, err.error.message),
                    None => err.error.message,
                },
                Err(e) => e.to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        into_response(body, &request.config.model)
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_blank()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Registers `type: gemini` with the provider registry.
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_settings(settings)?))
    }

    fn default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, ToolDefinition, ToolResult};

    fn search_tool() -> ToolDefinition {
        ToolDefinition {
            name: "search_internal_documents".into(),
            description: "Search internal documents.".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        }
    }

    #[test]
    fn test_json_mode_without_tools() {
        let request = CompletionRequest::new(CompletionConfig::default())
            .with_system("You are the Policy Orchestrator.")
            .with_message(ChatMessage::user("Extract checks"))
            .with_json_mode(true);

        let wire = serde_json::to_value(GeminiProvider::build_request(&request)).unwrap();
        assert_eq!(wire["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "You are the Policy Orchestrator.");
        assert!(wire.get("tools").is_none());
    }

    #[test]
    fn test_json_mode_dropped_with_tools() {
        let request = CompletionRequest::new(CompletionConfig::default())
            .with_message(ChatMessage::user("Find evidence"))
            .with_tools(vec![search_tool()])
            .with_json_mode(true);

        let wire = serde_json::to_value(GeminiProvider::build_request(&request)).unwrap();
        assert!(wire["generationConfig"].get("responseMimeType").is_none());
        assert_eq!(
            wire["tools"][0]["functionDeclarations"][0]["name"],
            "search_internal_documents"
        );
    }

    #[test]
    fn test_function_round_trip_wire_format() {
        let request = CompletionRequest::new(CompletionConfig::default())
            .with_message(ChatMessage::user("Find evidence"))
            .with_message(ChatMessage::assistant_parts(vec![MessagePart::ToolCall(ToolCall {
                id: "call_0".into(),
                name: "execute_code".into(),
                input: json!({ "code": "sha256(\"x\")" }),
            })]))
            .with_message(ChatMessage::tool_results(vec![ToolResult {
                call_id: "call_0".into(),
                name: "execute_code".into(),
                content: json!("2d711642"),
                is_error: false,
            }]));

        let wire = serde_json::to_value(GeminiProvider::build_request(&request)).unwrap();
        assert_eq!(wire["contents"][1]["role"], "model");
        assert_eq!(wire["contents"][1]["parts"][0]["functionCall"]["name"], "execute_code");
        assert_eq!(
            wire["contents"][2]["parts"][0]["functionResponse"]["response"]["result"],
            "2d711642"
        );
    }

    #[test]
    fn test_response_parsing() {
        let body: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "search_internal_documents", "args": { "query": "backups" } } },
                        { "functionCall": { "name": "search_internal_documents", "args": { "query": "tape" } } }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 30, "candidatesTokenCount": 4 },
            "modelVersion": "gemini-2.0-flash-001"
        }))
        .unwrap();

        let response = into_response(body, "gemini-2.0-flash").unwrap();
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].id, "call_1");
        assert_eq!(calls[1].input["query"], "tape");
        assert_eq!(response.usage.total(), 34);
        assert_eq!(response.model, "gemini-2.0-flash-001");
    }

    #[test]
    fn test_empty_candidates_is_parse_error() {
        let body: GeminiResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(matches!(
            into_response(body, "gemini-2.0-flash"),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let provider = GeminiProvider::new("AIza-secret-gemini-key");
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains("AIza-secret-gemini-key"));
        assert_eq!(provider.name(), "gemini");
    }
}
