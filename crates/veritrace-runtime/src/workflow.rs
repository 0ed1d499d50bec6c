//! The audit workflow: one forward pass over a policy document.
//!
//! ```text
//! START -> DECOMPOSE -> (RETRIEVE -> VERIFY)* -> SUMMARIZE -> HASH -> EXPORT -> DONE
//! ```
//!
//! Every step is one [`ModelInvoker`] call and one trace entry. Under the
//! default [`FailurePolicy::BestEffort`] a failed call degrades its step
//! (fallback check, `Unknown` evidence, skipped verdict) and the run goes
//! on; only an unreadable policy document stops it, before any backend
//! call is made.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use veritrace_core::{
    sha256_hex, AuditReport, ComplianceCheck, ComplianceCheckList, ComplianceVerdict,
    EvidenceStore, LlmUsage, PolicyDocument, PolicyError, ReportError, ReportPaths,
    RetrievedEvidence, TraceEntry, TraceLog, VerdictTally,
};

use crate::config::{AuditConfig, OutputSettings};
use crate::evidence::EvidenceResolver;
use crate::invoker::{InvocationResult, ModelInvoker};
use crate::prompts::{self, AgentProfile};
use crate::providers::{CompletionConfig, LlmProvider};
use crate::resilience::{RetryPolicy, UsageTracker};
use crate::tools::{CallableTool, CodeExecutionTool, InternalDocSearchTool, ToolError};

/// Check audited when decomposition yields nothing usable.
pub const FALLBACK_CHECK: &str = "Verify that backups are retained for at least 90 days.";

/// Separator between the summary and its hash in the final text.
pub const HASH_SEPARATOR: &str = "--- AUDIT VERIFICATION HASH ---";

/// What a failed backend call does to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Degrade the step and carry on
    #[default]
    BestEffort,

    /// Abort the run at the first failed call
    FailFast,
}

/// Errors that stop an audit run.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    PolicyUnreadable(#[from] PolicyError),

    #[error("{step} failed: {message}")]
    CallFailed { step: String, message: String },

    #[error("Failed to export report: {0}")]
    Export(#[from] ReportError),

    #[error("Failed to set up invokers: {0}")]
    Setup(#[from] ToolError),
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    /// Executive summary text
    pub summary: String,

    pub report_hash: String,

    /// Whether `report_hash` equals the SHA-256 of `summary`
    pub hash_verified: bool,

    pub verdicts: Vec<ComplianceVerdict>,

    pub tally: VerdictTally,

    pub trace: TraceLog,

    /// Token usage of this run
    pub usage: LlmUsage,

    /// Where the report was written, when export is enabled
    pub report_paths: Option<ReportPaths>,
}

impl AuditOutcome {
    /// The summary with the verification hash appended.
    pub fn final_text(&self) -> String {
        format!(
            "{}\n\n{}\nReport Hash: {}",
            self.summary, HASH_SEPARATOR, self.report_hash
        )
    }
}

/// Runs audits with four agents sharing one backend.
#[derive(Debug)]
pub struct AuditWorkflow {
    orchestrator: ModelInvoker,
    retriever: ModelInvoker,
    verifier: ModelInvoker,
    reporter: ModelInvoker,
    store: Arc<EvidenceStore>,
    failure_policy: FailurePolicy,
    fallback_check: String,
    output: Option<OutputSettings>,
}

/// Builder for [`AuditWorkflow`].
pub struct AuditWorkflowBuilder {
    provider: Arc<dyn LlmProvider>,
    store: Option<Arc<EvidenceStore>>,
    retry: RetryPolicy,
    config: CompletionConfig,
    max_tool_rounds: usize,
    usage: Option<Arc<UsageTracker>>,
    failure_policy: FailurePolicy,
    fallback_check: String,
    output: Option<OutputSettings>,
}

impl AuditWorkflowBuilder {
    /// Evidence store searched by the retriever. Defaults to the demo store.
    pub fn store(mut self, store: Arc<EvidenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn completion_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn fallback_check(mut self, check: impl Into<String>) -> Self {
        self.fallback_check = check.into();
        self
    }

    /// Where to export reports.
    pub fn output(mut self, output: OutputSettings) -> Self {
        self.output = Some(output);
        self
    }

    /// Keep reports in memory only.
    pub fn without_export(mut self) -> Self {
        self.output = None;
        self
    }

    pub fn build(self) -> Result<AuditWorkflow, WorkflowError> {
        let store = self.store.unwrap_or_else(|| Arc::new(EvidenceStore::demo()));
        let usage = self.usage.unwrap_or_default();

        let invoker = |profile: AgentProfile, tools: Vec<Arc<dyn CallableTool>>| {
            let mut builder = ModelInvoker::builder(self.provider.clone())
                .name(profile.name)
                .description(profile.description)
                .instruction(profile.instruction.trim())
                .retry(self.retry)
                .config(self.config.clone())
                .max_tool_rounds(self.max_tool_rounds)
                .usage_tracker(usage.clone());
            for tool in tools {
                builder = builder.tool(tool);
            }
            builder.build()
        };

        let search: Arc<dyn CallableTool> = Arc::new(InternalDocSearchTool::new(store.clone()));
        let code: Arc<dyn CallableTool> = Arc::new(CodeExecutionTool::default());

        Ok(AuditWorkflow {
            orchestrator: invoker(prompts::ORCHESTRATOR, vec![])?,
            retriever: invoker(prompts::RETRIEVER, vec![search])?,
            verifier: invoker(prompts::VERIFIER, vec![])?,
            reporter: invoker(prompts::REPORTER, vec![code])?,
            store,
            failure_policy: self.failure_policy,
            fallback_check: self.fallback_check,
            output: self.output,
        })
    }
}

impl AuditWorkflow {
    pub fn builder(provider: Arc<dyn LlmProvider>) -> AuditWorkflowBuilder {
        AuditWorkflowBuilder {
            provider,
            store: None,
            retry: RetryPolicy::default(),
            config: CompletionConfig::default(),
            max_tool_rounds: 5,
            usage: None,
            failure_policy: FailurePolicy::default(),
            fallback_check: FALLBACK_CHECK.to_string(),
            output: Some(OutputSettings::default()),
        }
    }

    /// Builder populated from configuration.
    pub fn from_config(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        config: &AuditConfig,
        store: Arc<EvidenceStore>,
    ) -> AuditWorkflowBuilder {
        Self::builder(provider)
            .store(store)
            .retry(config.retry)
            .completion_config(completion)
            .max_tool_rounds(config.invoker.max_tool_rounds)
            .usage_tracker(Arc::new(UsageTracker::new(config.budget.max_tokens)))
            .failure_policy(config.workflow.failure_policy)
            .fallback_check(config.workflow.fallback_check.clone())
            .output(config.output.clone())
    }

    pub fn store(&self) -> &EvidenceStore {
        &self.store
    }

    /// Audit the policy document at `policy_path`.
    ///
    /// Fails before any backend call when the document cannot be read.
    pub async fn run(&self, policy_path: impl AsRef<Path>) -> Result<AuditOutcome, WorkflowError> {
        let policy = PolicyDocument::from_file(policy_path)?;
        self.run_document(&policy).await
    }

    /// Audit a policy document already in memory.
    pub async fn run_document(&self, policy: &PolicyDocument) -> Result<AuditOutcome, WorkflowError> {
        tracing::info!(policy = %policy.path().display(), "Starting compliance audit");
        let mut run = RunState::default();

        // DECOMPOSE
        let decomposition = self
            .orchestrator
            .invoke_typed::<ComplianceCheckList>(&prompts::decompose_prompt(policy.text()))
            .await;
        run.record("Orchestration", None, &decomposition);
        self.guard("Orchestration", &decomposition)?;

        let checks = match decomposition.value.map(ComplianceCheckList::into_checks) {
            Some(checks) if !checks.is_empty() => checks,
            _ => {
                tracing::warn!(fallback = %self.fallback_check, "Decomposition unusable, auditing fallback check");
                vec![ComplianceCheck::new(self.fallback_check.clone())]
            }
        };
        tracing::info!(checks = checks.len(), "Decomposed policy into checks");

        // RETRIEVE -> VERIFY
        let resolver = EvidenceResolver::new(&self.store);
        for (i, check) in checks.iter().enumerate() {
            let step = format!("Retrieval-{}", i);
            let retrieval = self
                .retriever
                .invoke_typed::<RetrievedEvidence>(&prompts::retrieve_prompt(check))
                .await;
            run.record(&step, Some(check), &retrieval);
            self.guard(&step, &retrieval)?;

            let evidence = resolver.resolve(&retrieval);
            tracing::debug!(
                check = i,
                document_id = %evidence.document_id,
                source = ?evidence.source,
                "Resolved evidence"
            );

            let step = format!("Verification-{}", i);
            let verification = self
                .verifier
                .invoke_typed::<ComplianceVerdict>(&prompts::verify_prompt(check, &evidence))
                .await;
            run.record(&step, Some(check), &verification);
            self.guard(&step, &verification)?;

            match verification.value {
                Some(verdict) => match verdict.validate() {
                    Ok(()) => {
                        tracing::info!(check = i, verdict = %verdict.verdict, "Check verified");
                        run.verdicts.push(verdict);
                    }
                    Err(e) => {
                        tracing::warn!(check = i, error = %e, "Skipping check with invalid verdict");
                    }
                },
                None => {
                    tracing::warn!(check = i, rule = %check, "Skipping check without a verdict");
                }
            }
        }

        // SUMMARIZE
        let summary = self
            .reporter
            .invoke(&prompts::summary_prompt(&run.verdicts), None)
            .await;
        run.record("Reporting", None, &summary);
        self.guard("Reporting", &summary)?;
        let summary_text = summary.text;

        // HASH
        let hashing = self.reporter.invoke(&prompts::hash_prompt(&summary_text), None).await;
        run.record("Hashing", None, &hashing);
        self.guard("Hashing", &hashing)?;

        let report_hash = reported_hash(&hashing);
        let hash_verified = report_hash == sha256_hex(&summary_text);
        if !hash_verified {
            tracing::warn!(report_hash = %report_hash, "Reported hash does not match the summary");
        }

        // EXPORT
        let report = AuditReport::new(
            policy.path().display().to_string(),
            run.verdicts.clone(),
            run.trace.clone(),
        )
        .with_hash(report_hash.clone(), hash_verified)
        .with_usage(run.usage.clone());

        let report_paths = match &self.output {
            Some(output) => Some(report.export(&output.dir, &output.json_file, &output.csv_file)?),
            None => None,
        };

        tracing::info!(
            verdicts = run.verdicts.len(),
            steps = run.trace.len(),
            hash_verified,
            "{}",
            report.tally.headline()
        );

        Ok(AuditOutcome {
            summary: summary_text,
            report_hash,
            hash_verified,
            tally: report.tally,
            verdicts: run.verdicts,
            trace: run.trace,
            usage: run.usage,
            report_paths,
        })
    }

    fn guard<T>(&self, step: &str, result: &InvocationResult<T>) -> Result<(), WorkflowError> {
        match (&result.metadata.error, self.failure_policy) {
            (Some(message), FailurePolicy::FailFast) => Err(WorkflowError::CallFailed {
                step: step.to_string(),
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// State owned by a single run.
#[derive(Default)]
struct RunState {
    trace: TraceLog,
    verdicts: Vec<ComplianceVerdict>,
    usage: LlmUsage,
}

impl RunState {
    fn record<T>(&mut self, step: &str, check: Option<&ComplianceCheck>, result: &InvocationResult<T>) {
        let mut metadata = result.metadata.to_json();
        if !result.tool_calls.is_empty() {
            metadata["tool_calls"] = json!(result.tool_calls);
        }

        self.usage.merge(&result.metadata.usage);
        self.trace.push(TraceEntry {
            step: step.to_string(),
            check: check.map(|c| c.to_string()),
            result: result.text.clone(),
            metadata,
        });
    }
}

/// The hash from the code tool's own output, else from the reply text.
fn reported_hash<T>(hashing: &InvocationResult<T>) -> String {
    let from_tool = hashing
        .last_tool_output(CodeExecutionTool::NAME)
        .and_then(|output| output.as_str())
        .and_then(find_sha256);

    from_tool
        .or_else(|| find_sha256(&hashing.text))
        .unwrap_or_else(|| hashing.text.trim().to_string())
}

/// First run of exactly 64 hex digits.
fn find_sha256(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_hexdigit())
        .find(|token| token.len() == 64)
        .map(|token| token.to_ascii_lowercase())
}
