//! # veritrace-runtime
//!
//! Model-backed execution for VeriTrace audits.
//!
//! `veritrace-core` holds the deterministic pieces; this crate adds
//! everything that talks to a generative backend:
//!
//! - [`ModelInvoker`]: schema-validated, retried, tool-augmented calls
//! - [`providers`]: the [`LlmProvider`] trait with Anthropic and Gemini backends
//! - [`tools`]: the search and code tools the backend may call
//! - [`AuditWorkflow`]: the decompose/retrieve/verify/report pipeline
//!
//! ## Important
//!
//! Backend calls never raise into the workflow. A call that fails after
//! its retries comes back as an [`InvocationResult`] with its metadata
//! marking the error, and the workflow decides what that costs the run.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use veritrace_runtime::config::ProviderSettings;
//! use veritrace_runtime::{AuditWorkflow, GeminiProvider};
//!
//! let provider = Arc::new(GeminiProvider::from_settings(&ProviderSettings::default())?);
//! let workflow = AuditWorkflow::builder(provider).build()?;
//!
//! let outcome = workflow.run("demo_docs/policy_document.txt").await?;
//! println!("{}", outcome.final_text());
//! ```

pub mod config;
pub mod evidence;
pub mod invoker;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod tools;
pub mod workflow;

pub use config::{AuditConfig, ConfigError};
pub use evidence::{EvidenceResolver, RestatementError};
pub use invoker::{
    InvocationError, InvocationMetadata, InvocationResult, ModelInvoker, ModelInvokerBuilder,
    ToolCallRecord,
};
pub use providers::{
    Backend, ChatMessage, CompletionConfig, CompletionRequest, CompletionResponse, LlmProvider,
    ProviderError, ProviderRegistry,
};
pub use resilience::{RetryPolicy, UsageTracker};
pub use tools::{CallableTool, CodeExecutionTool, InternalDocSearchTool, ToolError, ToolRegistry};
pub use workflow::{
    AuditOutcome, AuditWorkflow, AuditWorkflowBuilder, FailurePolicy, WorkflowError,
    FALLBACK_CHECK,
};

#[cfg(feature = "anthropic")]
pub use providers::AnthropicProvider;

#[cfg(feature = "gemini")]
pub use providers::GeminiProvider;
