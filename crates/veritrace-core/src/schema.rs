//! Declarative reply schemas.
//!
//! A [`StructuredSchema`] is an ordered set of named, typed fields. The same
//! definition renders the prompt instruction sent to the backend, the JSON
//! Schema used for validation, and (through serde) the typed value.

use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors from schema validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Failed to compile schema '{schema}': {message}")]
    Compile { schema: String, message: String },

    #[error("Reply does not match schema '{schema}': {}", violations.join("; "))]
    Violations {
        schema: String,
        violations: Vec<String>,
    },
}

/// Primitive type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Float,
    StringList,
}

impl FieldKind {
    fn label(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Float => "number",
            FieldKind::StringList => "list of strings",
        }
    }
}

/// One named field of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    name: String,
    kind: FieldKind,
    description: String,
    allowed: Vec<String>,
    range: Option<(f64, f64)>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            allowed: Vec::new(),
            range: None,
        }
    }

    /// Restrict a string field to a closed set of values.
    pub fn one_of<'a>(mut self, values: impl IntoIterator<Item = &'a str>) -> Self {
        self.allowed = values.into_iter().map(str::to_string).collect();
        self
    }

    /// Restrict a numeric field to an inclusive range.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn to_json_schema(&self) -> Value {
        let mut prop = Map::new();
        match self.kind {
            FieldKind::String => {
                prop.insert("type".into(), json!("string"));
                if !self.allowed.is_empty() {
                    prop.insert("enum".into(), json!(self.allowed));
                }
            }
            FieldKind::Float => {
                prop.insert("type".into(), json!("number"));
                if let Some((min, max)) = self.range {
                    prop.insert("minimum".into(), json!(min));
                    prop.insert("maximum".into(), json!(max));
                }
            }
            FieldKind::StringList => {
                prop.insert("type".into(), json!("array"));
                prop.insert("items".into(), json!({ "type": "string" }));
            }
        }
        prop.insert("description".into(), json!(self.description));
        Value::Object(prop)
    }

    fn instruction_line(&self) -> String {
        let mut line = format!("- \"{}\" ({}): {}", self.name, self.kind.label(), self.description);
        if !self.allowed.is_empty() {
            let quoted: Vec<String> = self.allowed.iter().map(|v| format!("\"{}\"", v)).collect();
            line.push_str(&format!(" Must be one of: {}.", quoted.join(", ")));
        }
        if let Some((min, max)) = self.range {
            line.push_str(&format!(" Must be between {} and {}.", min, max));
        }
        line
    }
}

/// Expected shape of a structured reply.
pub struct StructuredSchema {
    name: String,
    fields: Vec<SchemaField>,
    compiled: OnceLock<Result<jsonschema::Validator, String>>,
}

impl StructuredSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            compiled: OnceLock::new(),
        }
    }

    /// Append a field. Field order is preserved in instructions.
    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Render as a JSON Schema object. Every field is required.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Natural-language instruction describing the reply format.
    pub fn instructions(&self) -> String {
        let mut text = String::from(
            "Respond ONLY with a single JSON object, without commentary, containing these fields:\n",
        );
        for field in &self.fields {
            text.push_str(&field.instruction_line());
            text.push('\n');
        }
        text
    }

    fn validator(&self) -> Result<&jsonschema::Validator, SchemaError> {
        let result = self.compiled.get_or_init(|| {
            jsonschema::options()
                .build(&self.to_json_schema())
                .map_err(|e| e.to_string())
        });

        result.as_ref().map_err(|message| SchemaError::Compile {
            schema: self.name.clone(),
            message: message.clone(),
        })
    }

    /// Validate a payload, collecting every violation.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaError> {
        let validator = self.validator()?;

        let violations: Vec<String> = validator
            .iter_errors(payload)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Violations {
                schema: self.name.clone(),
                violations,
            })
        }
    }

    /// Whether a payload passes validation.
    pub fn is_valid(&self, payload: &Value) -> bool {
        self.validator()
            .map(|v| v.is_valid(payload))
            .unwrap_or(false)
    }
}

impl fmt::Debug for StructuredSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}
