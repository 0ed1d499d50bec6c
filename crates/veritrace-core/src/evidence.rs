//! Evidence supporting a compliance verdict.
//!
//! Every verdict must be traceable to the document excerpt it was judged
//! against, and to how that excerpt reached the verifier.

use serde::{Deserialize, Serialize};

/// Document id used when the source of an excerpt cannot be determined.
pub const UNKNOWN_DOCUMENT: &str = "Unknown";

/// How an excerpt reached the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Returned directly by the search tool
    Tool,
    /// Restated by the model as structured JSON
    ModelReply,
    /// Unparseable model text used verbatim
    RawText,
    /// Read straight from the evidence store
    Store,
}

/// A document excerpt supporting a check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// Identifier of the source document
    pub document_id: String,

    /// The excerpt text
    pub excerpt: String,

    /// Where the excerpt came from
    pub source: EvidenceSource,
}

impl Evidence {
    /// Evidence read from the store.
    pub fn from_store(document_id: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            excerpt: excerpt.into(),
            source: EvidenceSource::Store,
        }
    }

    /// Evidence returned by the search tool.
    pub fn from_tool(document_id: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            excerpt: excerpt.into(),
            source: EvidenceSource::Tool,
        }
    }

    /// Evidence restated by the model.
    pub fn from_model_reply(document_id: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            excerpt: excerpt.into(),
            source: EvidenceSource::ModelReply,
        }
    }

    /// Raw reply text of unknown origin.
    pub fn from_raw_text(text: impl Into<String>) -> Self {
        Self {
            document_id: UNKNOWN_DOCUMENT.to_string(),
            excerpt: text.into(),
            source: EvidenceSource::RawText,
        }
    }

    /// Whether the document id is known.
    pub fn is_attributed(&self) -> bool {
        self.document_id != UNKNOWN_DOCUMENT
    }
}
