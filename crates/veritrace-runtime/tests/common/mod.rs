//! A scripted in-process backend that plays all four audit agents.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::Arc;

use veritrace_core::store::mock::MOCK_POLICY_CHECKS;
use veritrace_runtime::prompts;
use veritrace_runtime::providers::{
    CompletionRequest, CompletionResponse, LlmProvider, MessagePart, ProviderError, TokenUsage,
    ToolCall,
};

/// Which agent a request is addressed to, by its system instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agent {
    Orchestrator,
    Retriever,
    Verifier,
    Reporter,
    Unknown,
}

impl Agent {
    fn of(request: &CompletionRequest) -> Self {
        let system = request.system.as_deref().unwrap_or_default();
        if system == prompts::ORCHESTRATOR.instruction.trim() {
            Agent::Orchestrator
        } else if system == prompts::RETRIEVER.instruction.trim() {
            Agent::Retriever
        } else if system == prompts::VERIFIER.instruction.trim() {
            Agent::Verifier
        } else if system == prompts::REPORTER.instruction.trim() {
            Agent::Reporter
        } else {
            Agent::Unknown
        }
    }
}

/// Backend that answers like a well-behaved model over the demo store.
pub struct FakeAuditor {
    /// Raw orchestrator reply
    pub decomposition: String,

    /// Checks whose verification call fails terminally
    pub failing_checks: HashSet<String>,

    /// Throttle this many orchestrator calls before answering
    pub throttle_first: Mutex<u32>,

    pub requests: Mutex<Vec<(Agent, CompletionRequest)>>,
}

impl Default for FakeAuditor {
    fn default() -> Self {
        Self {
            decomposition: json!({ "checks": MOCK_POLICY_CHECKS }).to_string(),
            failing_checks: HashSet::new(),
            throttle_first: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeAuditor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_decomposition(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            decomposition: reply.into(),
            ..Self::default()
        })
    }

    pub fn failing_verification(check: &str) -> Arc<Self> {
        Arc::new(Self {
            failing_checks: [check.to_string()].into_iter().collect(),
            ..Self::default()
        })
    }

    pub fn throttled(times: u32) -> Arc<Self> {
        Arc::new(Self {
            throttle_first: Mutex::new(times),
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_to(&self, agent: Agent) -> usize {
        self.requests.lock().iter().filter(|(a, _)| *a == agent).count()
    }

    fn orchestrate(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut remaining = self.throttle_first.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ProviderError::RateLimited);
        }

        let prompt = first_prompt(request);
        let policy = between(&prompt, "POLICY DOCUMENT:\n", "\n\nRespond").unwrap_or_default();
        if policy.trim().is_empty() {
            return Ok(text("The policy document is empty, so there is nothing to decompose."));
        }
        Ok(text(&self.decomposition))
    }

    fn retrieve(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        if let Some(outcome) = last_tool_result(request) {
            return Ok(match outcome["status"].as_str() {
                Some("success") => text(&format!(
                    "```json\n{}\n```",
                    json!({
                        "evidence_text": outcome["excerpt"],
                        "document_id": outcome["document_id"],
                    })
                )),
                _ => text("The search returned no evidence for this check."),
            });
        }

        let prompt = first_prompt(request);
        let check = between(&prompt, "compliance check: ", "\n\n").unwrap_or_default();
        Ok(tool_call("search_internal_documents", json!({ "query": check })))
    }

    fn verify(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let prompt = first_prompt(request);
        let rule = between(&prompt, "POLICY RULE: ", "\n").unwrap_or_default();
        if self.failing_checks.contains(&rule) {
            return Err(ProviderError::AuthError);
        }

        let document_id = between(&prompt, "(document ", ")").unwrap_or_default();
        let (verdict, reasoning) = if document_id == "Unknown" {
            ("NEEDS_REVIEW", "No attributable evidence was retrieved.")
        } else if prompt.contains("95 days") || prompt.contains("is not tracked") {
            ("NON-COMPLIANT", "The evidence contradicts the rule.")
        } else {
            ("COMPLIANT", "The evidence satisfies the rule.")
        };

        Ok(text(
            &json!({
                "policy_rule": rule,
                "document_id": document_id,
                "verdict": verdict,
                "reasoning": reasoning,
                "confidence": 0.9,
            })
            .to_string(),
        ))
    }

    fn report(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        if let Some(output) = last_tool_result(request) {
            return Ok(text(output.as_str().unwrap_or_default().trim()));
        }

        let prompt = first_prompt(request);
        if prompt.starts_with("Compute the SHA-256") {
            let code = between(&prompt, "JSON string literal: ", "\n\nTEXT:").unwrap_or_default();
            return Ok(tool_call("execute_code", json!({ "code": code })));
        }
        Ok(text("Executive summary: SOP-101 retention and the vendor contract register need remediation."))
    }
}

#[async_trait]
impl LlmProvider for FakeAuditor {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let agent = Agent::of(request);
        self.requests.lock().push((agent, request.clone()));

        match agent {
            Agent::Orchestrator => self.orchestrate(request),
            Agent::Retriever => self.retrieve(request),
            Agent::Verifier => self.verify(request),
            Agent::Reporter => self.report(request),
            Agent::Unknown => Err(ProviderError::ApiError {
                status: 400,
                message: "unrecognized agent".into(),
            }),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake-auditor"
    }
}

fn text(reply: &str) -> CompletionResponse {
    let mut response = CompletionResponse::text_reply(reply, "fake-1");
    response.usage = TokenUsage {
        prompt_tokens: 20,
        completion_tokens: 10,
    };
    response
}

fn tool_call(name: &str, input: JsonValue) -> CompletionResponse {
    CompletionResponse {
        parts: vec![MessagePart::ToolCall(ToolCall {
            id: "call_0".into(),
            name: name.into(),
            input,
        })],
        usage: TokenUsage {
            prompt_tokens: 20,
            completion_tokens: 5,
        },
        model: "fake-1".into(),
        stop_reason: Some("tool_use".into()),
    }
}

fn first_prompt(request: &CompletionRequest) -> String {
    request
        .messages
        .first()
        .map(|m| m.text())
        .unwrap_or_default()
}

fn last_tool_result(request: &CompletionRequest) -> Option<JsonValue> {
    request.messages.last()?.parts.iter().find_map(|part| match part {
        MessagePart::ToolResult(result) => Some(result.content.clone()),
        _ => None,
    })
}

fn between(text: &str, start: &str, end: &str) -> Option<String> {
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    let to = rest.find(end).unwrap_or(rest.len());
    Some(rest[..to].to_string())
}
