//! # Audit Subcommand
//!
//! Loads configuration, applies flag overrides, builds the backend and
//! runs the workflow over one policy document.

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use veritrace_runtime::{
    AuditConfig, AuditOutcome, AuditWorkflow, FailurePolicy, ProviderRegistry,
};

/// Arguments for the audit subcommand.
#[derive(Args, Debug, Default)]
pub struct AuditArgs {
    /// Plain-text policy document to audit.
    pub policy: PathBuf,

    /// YAML configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Backend type: "gemini" or "anthropic".
    #[arg(long)]
    pub provider: Option<String>,

    /// Model id, overriding the configured one.
    #[arg(long)]
    pub model: Option<String>,

    /// Directory for the JSON and CSV reports.
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Directory of evidence documents to load alongside the demo mapping.
    #[arg(long)]
    pub docs_dir: Option<PathBuf>,

    /// Abort at the first failed backend call.
    #[arg(long)]
    pub fail_fast: bool,
}

impl AuditArgs {
    /// Configuration file values with flags applied on top.
    pub fn resolve_config(&self) -> anyhow::Result<AuditConfig> {
        let mut config = match &self.config {
            Some(path) => AuditConfig::from_file(path)?,
            None => AuditConfig::default(),
        };

        if let Some(provider) = &self.provider {
            config.provider.kind = provider.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = Some(model.clone());
        }
        if let Some(dir) = &self.out_dir {
            config.output.dir = dir.clone();
        }
        if let Some(dir) = &self.docs_dir {
            config.workflow.docs_dir = Some(dir.clone());
        }
        if self.fail_fast {
            config.workflow.failure_policy = FailurePolicy::FailFast;
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn run(args: &AuditArgs) -> anyhow::Result<AuditOutcome> {
    let config = args.resolve_config()?;
    let kind = config.provider.kind.as_str();

    let backend = ProviderRegistry::with_defaults()
        .resolve(&config.provider)
        .with_context(|| format!("Could not create the '{}' backend", kind))?;

    let store = crate::build_store(config.workflow.docs_dir.as_deref())?;
    tracing::info!(
        provider = kind,
        model = %backend.completion.model,
        documents = store.len(),
        "Configured audit"
    );

    let workflow = AuditWorkflow::from_config(backend.provider, backend.completion, &config, Arc::new(store)).build()?;
    let outcome = workflow.run(&args.policy).await?;

    if let Some(paths) = &outcome.report_paths {
        tracing::info!(json = %paths.json.display(), csv = %paths.csv.display(), "Reports written");
    }
    Ok(outcome)
}
