//! Allow-list code execution.

use serde_json::{json, Value as JsonValue};
use veritrace_core::SandboxedCodeRunner;

use super::{string_argument, CallableTool, ToolError};

/// Exposes [`SandboxedCodeRunner::run`] to the backend.
#[derive(Debug, Clone)]
pub struct CodeExecutionTool {
    runner: SandboxedCodeRunner,
    description: String,
}

impl CodeExecutionTool {
    pub const NAME: &'static str = "execute_code";

    pub fn new(runner: SandboxedCodeRunner) -> Self {
        let operations: Vec<&str> = runner.operations().collect();
        let description = format!(
            "Execute a short utility snippet and return its printed output. One call per line, \
             e.g. sha256(\"text\") or print(json_format({{\"a\": 1}})). Arguments are JSON \
             literals or nested calls. Available operations: {}.",
            operations.join(", ")
        );
        Self { runner, description }
    }
}

impl Default for CodeExecutionTool {
    fn default() -> Self {
        Self::new(SandboxedCodeRunner::new())
    }
}

impl CallableTool for CodeExecutionTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The snippet to execute."
                }
            },
            "required": ["code"]
        })
    }

    fn call(&self, input: &JsonValue) -> Result<JsonValue, ToolError> {
        let code = string_argument(Self::NAME, input, "code")?;
        Ok(JsonValue::String(self.runner.run(&code)))
    }
}
