//! Audit report export.
//!
//! A finished run is written twice: a structured JSON document carrying the
//! full verdict set, the summary hash and the trace log, and a flat CSV table
//! with one row per verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::tally::VerdictTally;
use crate::types::{ComplianceVerdict, TraceLog};
use crate::usage::LlmUsage;

/// CSV column headers, in order.
pub const CSV_HEADER: [&str; 5] = ["Policy Rule", "Verdict", "Confidence", "Document ID", "Reasoning"];

/// Errors that can occur when writing or reading reports.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to access report file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
    move |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The structured record of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Unique id of this run
    pub run_id: Uuid,

    /// When the report was produced
    pub timestamp: DateTime<Utc>,

    /// Path of the audited policy document
    pub policy_document: String,

    /// Every accepted verdict, in check order
    pub verdicts: Vec<ComplianceVerdict>,

    pub tally: VerdictTally,

    /// Hash of the executive summary
    pub report_hash: String,

    /// Whether `report_hash` matches a locally computed SHA-256 of the summary
    #[serde(default)]
    pub hash_verified: bool,

    #[serde(default)]
    pub usage: LlmUsage,

    pub trace_log: TraceLog,
}

/// Where a report was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl AuditReport {
    /// Start a report for a run. The tally is computed from `verdicts`.
    pub fn new(
        policy_document: impl Into<String>,
        verdicts: Vec<ComplianceVerdict>,
        trace_log: TraceLog,
    ) -> Self {
        let tally = VerdictTally::from_verdicts(&verdicts);
        Self {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            policy_document: policy_document.into(),
            verdicts,
            tally,
            report_hash: String::new(),
            hash_verified: false,
            usage: LlmUsage::default(),
            trace_log,
        }
    }

    pub fn with_hash(mut self, report_hash: impl Into<String>, verified: bool) -> Self {
        self.report_hash = report_hash.into();
        self.hash_verified = verified;
        self
    }

    pub fn with_usage(mut self, usage: LlmUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Write the pretty-printed JSON report.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_error(path))
    }

    /// Read a JSON report back.
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(io_error(path))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Render the verdict table as CSV.
    pub fn to_csv(&self) -> String {
        let mut out = csv_row(CSV_HEADER.iter().copied());
        for v in &self.verdicts {
            // Debug keeps the trailing ".0" on whole numbers
            let confidence = format!("{:?}", v.confidence);
            out.push_str(&csv_row([
                v.policy_rule.as_str(),
                v.verdict.as_str(),
                confidence.as_str(),
                v.document_id.as_str(),
                v.reasoning.as_str(),
            ]));
        }
        out
    }

    /// Write the verdict table as CSV.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        fs::write(path, self.to_csv()).map_err(io_error(path))
    }

    /// Write both files into `dir`, creating it if needed.
    pub fn export(
        &self,
        dir: impl AsRef<Path>,
        json_name: &str,
        csv_name: &str,
    ) -> Result<ReportPaths, ReportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(io_error(dir))?;

        let paths = ReportPaths {
            json: dir.join(json_name),
            csv: dir.join(csv_name),
        };
        self.write_json(&paths.json)?;
        self.write_csv(&paths.csv)?;

        tracing::info!(
            json = %paths.json.display(),
            csv = %paths.csv.display(),
            verdicts = self.verdicts.len(),
            "Exported audit report"
        );
        Ok(paths)
    }
}

/// One RFC 4180 record, CRLF-terminated.
fn csv_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut row = fields.into_iter().map(csv_field).collect::<Vec<_>>().join(",");
    row.push_str("\r\n");
    row
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
