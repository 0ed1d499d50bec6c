//! Structured payload extraction from free-form model text.
//!
//! Models often wrap JSON in Markdown fences regardless of instructions.
//! Extraction priority:
//! 1. a `json`-tagged fence
//! 2. any other fence (plain or with a different info string)
//! 3. the whole text
//!
//! An unterminated fence runs to the end of the text. The result is
//! always trimmed.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{SchemaError, StructuredSchema};
use crate::types::StructuredOutput;

lazy_static! {
    /// ```json ... ``` (tag is case-insensitive)
    static ref TAGGED_FENCE: Regex = Regex::new(
        r"(?s)```(?i:json)[ \t]*\r?\n?(.*?)(?:```|\z)"
    ).unwrap();

    /// ``` ... ``` with an optional info string of any other language
    static ref PLAIN_FENCE: Regex = Regex::new(
        r"(?s)```[\w+-]*[ \t]*\r?\n?(.*?)(?:```|\z)"
    ).unwrap();
}

/// Errors from parsing a structured reply.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Reply is empty")]
    Empty,

    #[error("Reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Reply does not deserialize into {target}: {message}")]
    Shape { target: String, message: String },
}

/// Extract the structured payload from model text.
pub fn extract_payload(text: &str) -> &str {
    if let Some(inner) = TAGGED_FENCE.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    if let Some(inner) = PLAIN_FENCE.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    text.trim()
}

/// Extract, parse, and validate a reply against a schema.
pub fn parse_structured(text: &str, schema: &StructuredSchema) -> Result<Value, ExtractError> {
    let payload = extract_payload(text);
    if payload.is_empty() {
        return Err(ExtractError::Empty);
    }

    let value: Value = serde_json::from_str(payload)?;
    schema.validate(&value)?;
    Ok(value)
}

/// Convert a validated payload into its typed form.
pub fn into_typed<T: StructuredOutput>(value: Value) -> Result<T, ExtractError> {
    serde_json::from_value(value).map_err(|e| ExtractError::Shape {
        target: T::schema().name().to_string(),
        message: e.to_string(),
    })
}

/// Extract, parse, validate, and deserialize a reply.
pub fn parse_typed<T: StructuredOutput>(text: &str) -> Result<T, ExtractError> {
    let value = parse_structured(text, T::schema())?;
    into_typed(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComplianceCheckList, ComplianceVerdict, VerdictCategory};
    use proptest::prelude::*;

    #[test]
    fn test_tagged_fence() {
        let text = "Here you go:\n```json\n{\"checks\": [\"a\"]}\n```\nThanks.";
        assert_eq!(extract_payload(text), "{\"checks\": [\"a\"]}");
    }

    #[test]
    fn test_plain_fence() {
        let text = "```\n{\"checks\": [\"a\"]}\n```";
        assert_eq!(extract_payload(text), "{\"checks\": [\"a\"]}");
    }

    #[test]
    fn test_other_info_string_is_stripped() {
        let text = "```javascript\n{\"a\": 1}\n```";
        assert_eq!(extract_payload(text), "{\"a\": 1}");
    }

    #[test]
    fn test_tagged_fence_wins_over_earlier_plain_fence() {
        let text = "```\nnot it\n```\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_payload(text), "{\"a\": 1}");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let text = "```json\n{\"a\": 1}\n";
        assert_eq!(extract_payload(text), "{\"a\": 1}");
    }

    #[test]
    fn test_raw_text_is_trimmed() {
        assert_eq!(extract_payload("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_typed_verdict() {
        let text = r#"```json
{
  "policy_rule": "Verify that user account data is purged within 90 days of closure.",
  "document_id": "SOP-101",
  "verdict": "NON-COMPLIANT",
  "reasoning": "Data is deleted after 95 days.",
  "confidence": 0.95
}
```"#;
        let verdict: ComplianceVerdict = parse_typed(text).unwrap();
        assert_eq!(verdict.verdict, VerdictCategory::NonCompliant);
        assert_eq!(verdict.document_id, "SOP-101");
    }

    #[test]
    fn test_parse_typed_rejects_prose() {
        let result = parse_typed::<ComplianceCheckList>("I could not find any checks.");
        assert!(matches!(result, Err(ExtractError::Json(_))));
    }

    #[test]
    fn test_parse_typed_rejects_schema_violation() {
        let result = parse_typed::<ComplianceCheckList>("{\"checks\": \"one\"}");
        assert!(matches!(result, Err(ExtractError::Schema(_))));
    }

    #[test]
    fn test_empty_fence_is_empty() {
        let result = parse_typed::<ComplianceCheckList>("```json\n```");
        assert!(matches!(result, Err(ExtractError::Empty)));
    }

    proptest! {
        #[test]
        fn prop_tagged_and_plain_fences_agree(inner in "[a-zA-Z0-9{}\\[\\]\":, ]{0,40}") {
            let tagged = format!("```json\n{}\n```", inner);
            let plain = format!("```\n{}\n```", inner);
            prop_assert_eq!(extract_payload(&tagged), extract_payload(&plain));
            prop_assert_eq!(extract_payload(&tagged), inner.trim());
        }

        #[test]
        fn prop_extraction_is_idempotent(text in "[a-zA-Z0-9{}\":,` \n]{0,60}") {
            let once = extract_payload(&text).to_string();
            let twice = extract_payload(&once).to_string();
            prop_assert_eq!(once, twice);
        }
    }
}
