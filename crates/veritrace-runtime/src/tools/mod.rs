//! Callable tools the backend may invoke mid-conversation.
//!
//! A tool is anything with a unique name, a usage hint, a JSON Schema for
//! its input and a synchronous call. Invokers hold their tools in a
//! [`ToolRegistry`] and dispatch by name; the backend never sees more than
//! the definitions.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::providers::ToolDefinition;

mod code;
mod search;

pub use code::CodeExecutionTool;
pub use search::InternalDocSearchTool;

/// Errors from tool dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{0}' is already registered")]
    Duplicate(String),

    #[error("Invalid input for {tool}: {message}")]
    InvalidInput { tool: String, message: String },
}

/// A named operation exposed to the backend.
pub trait CallableTool: Send + Sync {
    /// Stable name, unique within a registry.
    fn name(&self) -> &str;

    /// Usage hint shown to the backend.
    fn description(&self) -> &str;

    /// JSON Schema of the input object.
    fn input_schema(&self) -> JsonValue;

    fn call(&self, input: &JsonValue) -> Result<JsonValue, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Read a single string argument given either as `{key: "..."}` or as a
/// bare string.
pub(crate) fn string_argument(tool: &str, input: &JsonValue, key: &str) -> Result<String, ToolError> {
    match input {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Object(map) => map
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ToolError::InvalidInput {
                tool: tool.to_string(),
                message: format!("expected a string field '{}'", key),
            }),
        other => Err(ToolError::InvalidInput {
            tool: tool.to_string(),
            message: format!("expected an object or string, got {}", other),
        }),
    }
}

/// Tools declared for one invoker.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn CallableTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn CallableTool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Definitions sent to the backend, in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Run a tool by name.
    pub fn dispatch(&self, name: &str, input: &JsonValue) -> Result<JsonValue, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tracing::debug!(tool = name, "Dispatching tool call");
        tool.call(input)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
