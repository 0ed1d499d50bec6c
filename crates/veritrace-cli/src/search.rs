//! # Search Subcommand
//!
//! Runs one query against the evidence store, without a backend.

use clap::Args;
use std::path::PathBuf;

/// Arguments for the search subcommand.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text, typically a compliance check.
    pub query: String,

    /// Directory of evidence documents to load alongside the demo mapping.
    #[arg(long)]
    pub docs_dir: Option<PathBuf>,
}

/// Search and render the outcome as pretty JSON.
pub fn run(args: &SearchArgs) -> anyhow::Result<String> {
    let store = crate::build_store(args.docs_dir.as_deref())?;
    let outcome = store.search(&args.query);
    Ok(serde_json::to_string_pretty(&outcome)?)
}
