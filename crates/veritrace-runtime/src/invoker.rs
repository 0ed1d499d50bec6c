//! Structured, retried, tool-augmented model calls.
//!
//! A [`ModelInvoker`] turns a prompt into an [`InvocationResult`]:
//!
//! 1. Optional schema instructions are appended to the prompt
//! 2. Each backend round is retried on throttling with [`RetryPolicy`]
//! 3. Tool calls in a reply are dispatched through the [`ToolRegistry`] and
//!    their results fed back until the backend answers in text
//! 4. The reply is fence-stripped, parsed and validated against the schema
//!
//! `invoke` never returns an error. A call that fails terminally yields a
//! result whose text carries the error message and whose metadata has
//! `error` set, so a batch workflow can carry on with the next item.

use backon::Retryable;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use veritrace_core::extract::into_typed;
use veritrace_core::{parse_structured, LlmUsage, StructuredOutput, StructuredSchema};

use crate::providers::{
    ChatMessage, CompletionConfig, CompletionRequest, CompletionResponse, LlmProvider,
    ProviderError, ToolCall, ToolResult,
};
use crate::resilience::{RetryPolicy, UsageTracker};
use crate::tools::{CallableTool, ToolError, ToolRegistry};

/// Terminal failures of one invocation.
#[derive(Error, Debug, Clone)]
pub enum InvocationError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Budget exceeded")]
    BudgetExceeded,

    #[error("Backend call failed after {attempts} attempt(s): {source}")]
    Backend {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Backend still requesting tools after {0} tool round(s)")]
    ToolRoundsExhausted(usize),
}

/// What happened during a call, recorded in the trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationMetadata {
    /// Seconds elapsed for the whole call, retries and tool rounds included
    pub latency: f64,

    /// Names of the tools declared for this call
    pub tools: Vec<String>,

    /// Model that produced the reply (the configured model if none replied)
    pub model: String,

    pub provider: String,

    /// Backend requests made, retries included
    pub attempts: u32,

    pub usage: LlmUsage,

    /// Set when the call failed terminally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationMetadata {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// One tool dispatch made during a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: JsonValue,

    /// The tool's own return value, or `{"error": ..}` on failure
    pub output: JsonValue,

    pub is_error: bool,
}

/// Outcome of one model call.
#[derive(Debug, Clone)]
pub struct InvocationResult<T = JsonValue> {
    /// Final reply text, or the error message on failure
    pub text: String,

    /// Parsed value, present only when a schema was requested and the reply satisfied it
    pub value: Option<T>,

    pub metadata: InvocationMetadata,

    /// Tool dispatches in call order
    pub tool_calls: Vec<ToolCallRecord>,
}

impl<T> InvocationResult<T> {
    /// Whether the call failed terminally.
    pub fn is_error(&self) -> bool {
        self.metadata.error.is_some()
    }

    /// Output of the last successful call to `tool`.
    pub fn last_tool_output(&self, tool: &str) -> Option<&JsonValue> {
        self.tool_calls
            .iter()
            .rev()
            .find(|r| r.name == tool && !r.is_error)
            .map(|r| &r.output)
    }

    fn map_value<U>(self, f: impl FnOnce(T) -> Option<U>) -> InvocationResult<U> {
        InvocationResult {
            text: self.text,
            value: self.value.and_then(f),
            metadata: self.metadata,
            tool_calls: self.tool_calls,
        }
    }
}

/// A configured model caller: identity, instruction, tools and policies.
pub struct ModelInvoker {
    name: String,
    description: String,
    instruction: Option<String>,
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    retry: RetryPolicy,
    config: CompletionConfig,
    max_tool_rounds: usize,
    usage: Arc<UsageTracker>,
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("model", &self.config.model)
            .field("tools", &self.tools)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for [`ModelInvoker`].
pub struct ModelInvokerBuilder {
    name: String,
    description: String,
    instruction: Option<String>,
    provider: Arc<dyn LlmProvider>,
    tools: Vec<Arc<dyn CallableTool>>,
    retry: RetryPolicy,
    config: CompletionConfig,
    max_tool_rounds: usize,
    usage: Option<Arc<UsageTracker>>,
}

impl ModelInvokerBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// System instruction sent with every call.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn tool(mut self, tool: Arc<dyn CallableTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Share usage accounting (and its budget) with other invokers.
    pub fn usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Fails only on duplicate tool names.
    pub fn build(self) -> Result<ModelInvoker, ToolError> {
        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools.register(tool)?;
        }

        Ok(ModelInvoker {
            name: self.name,
            description: self.description,
            instruction: self.instruction,
            provider: self.provider,
            tools,
            retry: self.retry,
            config: self.config,
            max_tool_rounds: self.max_tool_rounds,
            usage: self.usage.unwrap_or_default(),
        })
    }
}

/// Per-call bookkeeping.
#[derive(Default)]
struct CallState {
    attempts: u32,
    model: Option<String>,
    usage: LlmUsage,
    tool_calls: Vec<ToolCallRecord>,
}

impl ModelInvoker {
    pub fn builder(provider: Arc<dyn LlmProvider>) -> ModelInvokerBuilder {
        ModelInvokerBuilder {
            name: "ModelInvoker".to_string(),
            description: String::new(),
            instruction: None,
            provider,
            tools: Vec::new(),
            retry: RetryPolicy::default(),
            config: CompletionConfig::default(),
            max_tool_rounds: 5,
            usage: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    pub fn usage_tracker(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Call the backend, optionally requesting a reply matching `schema`.
    pub async fn invoke(&self, prompt: &str, schema: Option<&StructuredSchema>) -> InvocationResult {
        let started = Instant::now();
        let mut state = CallState::default();

        let outcome = self.converse(prompt, schema, &mut state).await;

        let mut metadata = InvocationMetadata {
            latency: 0.0,
            tools: self.tools.names(),
            model: state.model.unwrap_or_else(|| self.config.model.clone()),
            provider: self.provider.name().to_string(),
            attempts: state.attempts,
            usage: state.usage,
            error: None,
        };

        let (text, value) = match outcome {
            Ok(text) => {
                let value = schema.and_then(|schema| match parse_structured(&text, schema) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(
                            invoker = %self.name,
                            schema = schema.name(),
                            error = %e,
                            "Structured reply did not parse"
                        );
                        None
                    }
                });
                (text, value)
            }
            Err(e) => {
                tracing::error!(invoker = %self.name, error = %e, "Invocation failed");
                metadata.error = Some(e.to_string());
                (format!("Error: {}", e), None)
            }
        };

        metadata.latency = started.elapsed().as_secs_f64();
        tracing::debug!(
            invoker = %self.name,
            latency = metadata.latency,
            attempts = metadata.attempts,
            tool_calls = state.tool_calls.len(),
            "Invocation complete"
        );

        InvocationResult {
            text,
            value,
            metadata,
            tool_calls: state.tool_calls,
        }
    }

    /// Call the backend and deserialize the reply into `T`.
    pub async fn invoke_typed<T: StructuredOutput>(&self, prompt: &str) -> InvocationResult<T> {
        let result = self.invoke(prompt, Some(T::schema())).await;
        let name = &self.name;
        result.map_value(|value| match into_typed::<T>(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(invoker = %name, error = %e, "Structured reply did not deserialize");
                None
            }
        })
    }

    /// Run the tool loop until the backend answers in text.
    async fn converse(
        &self,
        prompt: &str,
        schema: Option<&StructuredSchema>,
        state: &mut CallState,
    ) -> Result<String, InvocationError> {
        if prompt.trim().is_empty() {
            return Err(InvocationError::EmptyPrompt);
        }

        let content = match schema {
            Some(schema) => format!("{}\n\n{}", prompt, schema.instructions()),
            None => prompt.to_string(),
        };

        let mut request = CompletionRequest::new(self.config.clone())
            .with_tools(self.tools.definitions())
            .with_json_mode(schema.is_some())
            .with_message(ChatMessage::user(content));
        if let Some(instruction) = &self.instruction {
            request = request.with_system(instruction.clone());
        }

        for round in 0..=self.max_tool_rounds {
            if !self.usage.can_afford(self.estimate_request_tokens(&request)) {
                return Err(InvocationError::BudgetExceeded);
            }

            let response = self.complete_with_retry(&request, state).await?;
            self.usage.record(&response.usage, &response.model);
            state
                .usage
                .add(response.usage.prompt_tokens, response.usage.completion_tokens, &response.model);
            state.model = Some(response.model.clone());

            if !response.has_tool_calls() {
                return Ok(response.text());
            }
            if round == self.max_tool_rounds {
                break;
            }

            let results: Vec<ToolResult> = response
                .tool_calls()
                .into_iter()
                .map(|call| self.dispatch(call, state))
                .collect();

            request.messages.push(ChatMessage::assistant_parts(response.parts));
            request.messages.push(ChatMessage::tool_results(results));
        }

        Err(InvocationError::ToolRoundsExhausted(self.max_tool_rounds))
    }

    /// One backend round, retried on throttling.
    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
        state: &mut CallState,
    ) -> Result<CompletionResponse, InvocationError> {
        let attempts = AtomicU32::new(0);
        let provider = &self.provider;
        let counter = &attempts;

        let result = (move || {
            counter.fetch_add(1, Ordering::SeqCst);
            provider.complete(request)
        })
        .retry(self.retry)
        .sleep(tokio::time::sleep)
        .when(|e: &ProviderError| e.is_retryable())
        .notify(|e: &ProviderError, delay| {
            tracing::warn!(
                invoker = %self.name,
                attempt = counter.load(Ordering::SeqCst),
                delay = ?delay,
                error = %e,
                "Backend throttled, backing off"
            );
        })
        .await;

        let made = attempts.load(Ordering::SeqCst);
        state.attempts += made;
        result.map_err(|source| InvocationError::Backend {
            attempts: made,
            source,
        })
    }

    fn dispatch(&self, call: &ToolCall, state: &mut CallState) -> ToolResult {
        let (content, is_error) = match self.tools.dispatch(&call.name, &call.input) {
            Ok(output) => (output, false),
            Err(e) => {
                tracing::warn!(invoker = %self.name, tool = %call.name, error = %e, "Tool call failed");
                (json!({ "error": e.to_string() }), true)
            }
        };

        state.tool_calls.push(ToolCallRecord {
            name: call.name.clone(),
            input: call.input.clone(),
            output: content.clone(),
            is_error,
        });

        ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error,
        }
    }

    fn estimate_request_tokens(&self, request: &CompletionRequest) -> u32 {
        let messages = serde_json::to_string(&request.messages).unwrap_or_default();
        let system = request.system.as_deref().unwrap_or_default();
        self.provider.estimate_tokens(&messages) + self.provider.estimate_tokens(system)
    }
}
