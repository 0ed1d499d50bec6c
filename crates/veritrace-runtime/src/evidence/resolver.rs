//! Picks the evidence for one check out of a retrieval call.

use serde_json::Value as JsonValue;
use thiserror::Error;
use veritrace_core::{Evidence, EvidenceStore, RetrievedEvidence, SearchOutcome};

use crate::invoker::InvocationResult;
use crate::tools::InternalDocSearchTool;

/// Ways a model's restated evidence can disagree with the store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RestatementError {
    #[error("Document {document_id} is not in the evidence store")]
    UnknownDocument { document_id: String },

    #[error("Excerpt attributed to {document_id} does not appear in it: '{excerpt}'")]
    ExcerptMismatch {
        document_id: String,
        excerpt: String,
    },
}

/// Resolves retrieval evidence in priority order:
///
/// 1. the last search tool result with `status = success`
/// 2. the model's `{evidence_text, document_id}` restatement
/// 3. the raw reply text, attributed to `Unknown`
pub struct EvidenceResolver<'a> {
    store: &'a EvidenceStore,
}

impl<'a> EvidenceResolver<'a> {
    pub fn new(store: &'a EvidenceStore) -> Self {
        Self { store }
    }

    /// Evidence for one retrieval call.
    pub fn resolve(&self, result: &InvocationResult<RetrievedEvidence>) -> Evidence {
        if let Some(evidence) = Self::from_tool_calls(result) {
            return evidence;
        }

        if let Some(restated) = &result.value {
            if let Err(e) = self.check_restatement(restated) {
                tracing::warn!(error = %e, "Restated evidence does not match the store");
            }
            return Evidence::from_model_reply(&restated.document_id, &restated.evidence_text);
        }

        tracing::debug!("No structured evidence, using raw retrieval text");
        Evidence::from_raw_text(&result.text)
    }

    /// Check a restated excerpt against the document it names.
    ///
    /// Whitespace differences are ignored.
    pub fn check_restatement(&self, restated: &RetrievedEvidence) -> Result<(), RestatementError> {
        let document = self.store.document(&restated.document_id).ok_or_else(|| {
            RestatementError::UnknownDocument {
                document_id: restated.document_id.clone(),
            }
        })?;

        if !normalize_whitespace(document).contains(&normalize_whitespace(&restated.evidence_text)) {
            return Err(RestatementError::ExcerptMismatch {
                document_id: restated.document_id.clone(),
                excerpt: restated.evidence_text.clone(),
            });
        }

        Ok(())
    }

    fn from_tool_calls<T>(result: &InvocationResult<T>) -> Option<Evidence> {
        result
            .tool_calls
            .iter()
            .rev()
            .filter(|r| r.name == InternalDocSearchTool::NAME && !r.is_error)
            .find_map(|r| match parse_outcome(&r.output)? {
                SearchOutcome::Found {
                    document_id,
                    excerpt,
                } => Some(Evidence::from_tool(document_id, excerpt)),
                SearchOutcome::NotFound { .. } => None,
            })
    }
}

fn parse_outcome(output: &JsonValue) -> Option<SearchOutcome> {
    serde_json::from_value(output.clone()).ok()
}

/// Normalize whitespace for excerpt comparison.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
