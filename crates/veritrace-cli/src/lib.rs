//! # veritrace-cli
//!
//! Argument parsing and handlers for the `veritrace` binary.
//!
//! ## Subcommands
//!
//! - `audit` runs the full workflow over a policy document
//! - `search` queries the evidence store directly
//! - `run-code` executes a snippet in the allow-list code runner
//!
//! Handlers return the text to print; `main` owns stdout and logging.

pub mod audit;
pub mod code;
pub mod search;

use std::path::Path;
use veritrace_core::EvidenceStore;

/// Demo mapping plus, when given, every document in `docs_dir`.
pub fn build_store(docs_dir: Option<&Path>) -> anyhow::Result<EvidenceStore> {
    let mut builder = EvidenceStore::builder().demo_mapping();
    if let Some(dir) = docs_dir {
        builder = builder.load_dir(dir)?;
    }
    Ok(builder.build())
}
