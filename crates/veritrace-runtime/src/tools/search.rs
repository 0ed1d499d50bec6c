//! Keyword search over the evidence store.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use veritrace_core::EvidenceStore;

use super::{string_argument, CallableTool, ToolError};

/// Exposes [`EvidenceStore::search`] to the backend.
#[derive(Debug, Clone)]
pub struct InternalDocSearchTool {
    store: Arc<EvidenceStore>,
}

impl InternalDocSearchTool {
    pub const NAME: &'static str = "search_internal_documents";

    pub fn new(store: Arc<EvidenceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<EvidenceStore> {
        &self.store
    }
}

impl CallableTool for InternalDocSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search internal documents for compliance evidence. Returns the single best matching \
         document as {status: \"success\", document_id, excerpt}, or {status: \"error\", message} \
         when nothing matches."
    }

    fn input_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The compliance check to find evidence for, verbatim."
                }
            },
            "required": ["query"]
        })
    }

    fn call(&self, input: &JsonValue) -> Result<JsonValue, ToolError> {
        let query = string_argument(Self::NAME, input, "query")?;
        let outcome = self.store.search(&query);
        tracing::debug!(query = %query, found = outcome.is_found(), "Searched internal documents");

        serde_json::to_value(&outcome).map_err(|e| ToolError::InvalidInput {
            tool: Self::NAME.to_string(),
            message: e.to_string(),
        })
    }
}
