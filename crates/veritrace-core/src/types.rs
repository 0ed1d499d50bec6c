//! Domain types shared by every stage of an audit.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::schema::{FieldKind, SchemaField, StructuredSchema};

/// A single atomic, human-readable assertion extracted from a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplianceCheck(String);

impl ComplianceCheck {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComplianceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ComplianceCheck {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for ComplianceCheck {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Compliance status of one check. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerdictCategory {
    #[serde(rename = "COMPLIANT")]
    Compliant,
    #[serde(rename = "NON-COMPLIANT")]
    NonCompliant,
    #[serde(rename = "NEEDS_REVIEW")]
    NeedsReview,
}

impl VerdictCategory {
    /// All categories in reporting order.
    pub const ALL: [VerdictCategory; 3] = [
        VerdictCategory::Compliant,
        VerdictCategory::NonCompliant,
        VerdictCategory::NeedsReview,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "COMPLIANT",
            Self::NonCompliant => "NON-COMPLIANT",
            Self::NeedsReview => "NEEDS_REVIEW",
        }
    }
}

impl fmt::Display for VerdictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when a verdict violates its invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("confidence {0} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange(f64),

    #[error("verdict is missing a policy rule")]
    EmptyPolicyRule,
}

/// The terminal record for one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    /// The specific compliance rule being checked
    pub policy_rule: String,

    /// Identifier of the document providing the evidence
    pub document_id: String,

    /// The compliance status
    pub verdict: VerdictCategory,

    /// Argument for the verdict based only on the evidence provided
    pub reasoning: String,

    /// Confidence in the verdict (0.0 - 1.0)
    pub confidence: f64,
}

impl ComplianceVerdict {
    /// Check the verdict's invariants.
    pub fn validate(&self) -> Result<(), VerdictError> {
        if self.policy_rule.trim().is_empty() {
            return Err(VerdictError::EmptyPolicyRule);
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(VerdictError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

/// The decomposition step's reply shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCheckList {
    pub checks: Vec<String>,
}

impl ComplianceCheckList {
    /// Non-blank checks, trimmed, in reply order.
    pub fn into_checks(self) -> Vec<ComplianceCheck> {
        self.checks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .map(ComplianceCheck::from)
            .collect()
    }
}

/// The retrieval step's restated reply shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedEvidence {
    pub evidence_text: String,
    pub document_id: String,
}

/// A type that a model reply can be parsed into.
///
/// The schema is used both to instruct the backend and to validate the
/// reply before deserialization.
pub trait StructuredOutput: DeserializeOwned + Serialize + Send + 'static {
    fn schema() -> &'static StructuredSchema;
}

lazy_static::lazy_static! {
    static ref VERDICT_SCHEMA: StructuredSchema = StructuredSchema::new("ComplianceVerdict")
        .field(SchemaField::new(
            "policy_rule",
            FieldKind::String,
            "The specific compliance rule being checked.",
        ))
        .field(SchemaField::new(
            "document_id",
            FieldKind::String,
            "The ID of the internal document providing the evidence.",
        ))
        .field(
            SchemaField::new(
                "verdict",
                FieldKind::String,
                "The compliance status: 'COMPLIANT', 'NON-COMPLIANT', or 'NEEDS_REVIEW'.",
            )
            .one_of(VerdictCategory::ALL.iter().map(|c| c.as_str())),
        )
        .field(SchemaField::new(
            "reasoning",
            FieldKind::String,
            "The step-by-step logical argument for the verdict based only on the evidence provided.",
        ))
        .field(
            SchemaField::new(
                "confidence",
                FieldKind::Float,
                "A numerical confidence score (0.0 to 1.0) in the verdict.",
            )
            .range(0.0, 1.0),
        );

    static ref CHECK_LIST_SCHEMA: StructuredSchema = StructuredSchema::new("ComplianceCheckList")
        .field(SchemaField::new(
            "checks",
            FieldKind::StringList,
            "A list of atomic, verifiable compliance checks extracted from the policy document.",
        ));

    static ref RETRIEVED_EVIDENCE_SCHEMA: StructuredSchema = StructuredSchema::new("RetrievedEvidence")
        .field(SchemaField::new(
            "evidence_text",
            FieldKind::String,
            "The excerpt returned by the search tool, verbatim.",
        ))
        .field(SchemaField::new(
            "document_id",
            FieldKind::String,
            "The document id returned by the search tool.",
        ));
}

impl StructuredOutput for ComplianceVerdict {
    fn schema() -> &'static StructuredSchema {
        &VERDICT_SCHEMA
    }
}

impl StructuredOutput for ComplianceCheckList {
    fn schema() -> &'static StructuredSchema {
        &CHECK_LIST_SCHEMA
    }
}

impl StructuredOutput for RetrievedEvidence {
    fn schema() -> &'static StructuredSchema {
        &RETRIEVED_EVIDENCE_SCHEMA
    }
}

/// One step of an audit run's trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Step label (e.g., "Retrieval-0")
    pub step: String,

    /// The check this step worked on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,

    /// Raw result text of the step
    pub result: String,

    /// Call metadata as recorded by the invoker
    pub metadata: serde_json::Value,
}

/// Append-only record of every invocation in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Step labels in order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.step.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(confidence: f64) -> ComplianceVerdict {
        ComplianceVerdict {
            policy_rule: "Verify that PII is masked".to_string(),
            document_id: "AUDIT-SYS-DOC".to_string(),
            verdict: VerdictCategory::Compliant,
            reasoning: "No PII in QA.".to_string(),
            confidence,
        }
    }

    #[test]
    fn test_verdict_category_wire_names() {
        let json = serde_json::to_string(&VerdictCategory::NonCompliant).unwrap();
        assert_eq!(json, "\"NON-COMPLIANT\"");

        let parsed: VerdictCategory = serde_json::from_str("\"NEEDS_REVIEW\"").unwrap();
        assert_eq!(parsed, VerdictCategory::NeedsReview);

        assert!(serde_json::from_str::<VerdictCategory>("\"MAYBE\"").is_err());
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(verdict(0.0).validate().is_ok());
        assert!(verdict(1.0).validate().is_ok());
        assert_eq!(
            verdict(1.5).validate(),
            Err(VerdictError::ConfidenceOutOfRange(1.5))
        );
        assert!(verdict(-0.1).validate().is_err());
        assert!(verdict(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_empty_policy_rule_rejected() {
        let mut v = verdict(0.5);
        v.policy_rule = "  ".to_string();
        assert_eq!(v.validate(), Err(VerdictError::EmptyPolicyRule));
    }

    #[test]
    fn test_check_list_drops_blank_entries() {
        let list = ComplianceCheckList {
            checks: vec!["  Check A ".to_string(), "".to_string(), "Check B".to_string()],
        };
        let checks = list.into_checks();
        assert_eq!(checks, vec![ComplianceCheck::from("Check A"), ComplianceCheck::from("Check B")]);
    }

    #[test]
    fn test_trace_log_is_ordered() {
        let mut log = TraceLog::new();
        for step in ["Orchestration", "Retrieval-0", "Verification-0"] {
            log.push(TraceEntry {
                step: step.to_string(),
                check: None,
                result: String::new(),
                metadata: serde_json::json!({}),
            });
        }
        assert_eq!(
            log.steps().collect::<Vec<_>>(),
            vec!["Orchestration", "Retrieval-0", "Verification-0"]
        );
    }

    #[test]
    fn test_verdict_schema_lists_all_fields() {
        let names: Vec<_> = ComplianceVerdict::schema().fields().iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            vec!["policy_rule", "document_id", "verdict", "reasoning", "confidence"]
        );
    }
}
