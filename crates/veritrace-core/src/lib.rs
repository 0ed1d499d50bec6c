//! # veritrace-core
//!
//! Deterministic building blocks for VeriTrace compliance audits.
//!
//! This crate holds everything an audit needs that does not talk to a model:
//! - the data model (checks, evidence, verdicts, trace log)
//! - reply schemas and fenced-payload extraction
//! - the in-memory evidence store and the allow-list code runner
//! - verdict tallying and report export
//!
//! ## Key Guarantees
//!
//! 1. **No network calls**: model access lives in `veritrace-runtime`
//! 2. **Deterministic search**: same query, same store, same match
//! 3. **Bounded verdicts**: confidence is always within `0.0..=1.0`
//!
//! ## Example
//!
//! ```rust,ignore
//! use veritrace_core::{EvidenceStore, SandboxedCodeRunner, SearchOutcome};
//!
//! let store = EvidenceStore::demo();
//! if let SearchOutcome::Found { document_id, .. } =
//!     store.search("Verify that user account data is purged within 90 days of closure.")
//! {
//!     assert_eq!(document_id, "SOP-101");
//! }
//!
//! let runner = SandboxedCodeRunner::new();
//! println!("{}", runner.run("sha256(\"summary\")"));
//! ```

pub mod evidence;
pub mod extract;
pub mod policy;
pub mod report;
pub mod sandbox;
pub mod schema;
pub mod store;
pub mod tally;
pub mod types;
pub mod usage;

// Re-export main types at crate root
pub use evidence::{Evidence, EvidenceSource, UNKNOWN_DOCUMENT};
pub use extract::{extract_payload, parse_structured, parse_typed, ExtractError};
pub use policy::{PolicyDocument, PolicyError};
pub use report::{AuditReport, ReportError, ReportPaths};
pub use sandbox::{sha256_hex, SandboxError, SandboxedCodeRunner};
pub use schema::{FieldKind, SchemaError, SchemaField, StructuredSchema};
pub use store::{EvidenceStore, EvidenceStoreBuilder, SearchOutcome, StoreError};
pub use tally::VerdictTally;
pub use types::{
    ComplianceCheck, ComplianceCheckList, ComplianceVerdict, RetrievedEvidence, StructuredOutput,
    TraceEntry, TraceLog, VerdictCategory, VerdictError,
};
pub use usage::LlmUsage;
