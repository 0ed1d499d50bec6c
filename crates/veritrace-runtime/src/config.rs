//! Audit configuration from YAML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) is a complete configuration. Durations are written in human form:
//!
//! ```yaml
//! provider:
//!   type: gemini
//!   model: gemini-2.0-flash
//!   timeout: 60s
//! retry:
//!   max_attempts: 5
//!   base_delay: 10s
//!   max_jitter: 5s
//! workflow:
//!   failure_policy: best_effort
//!   docs_dir: demo_docs/evidence
//! output:
//!   dir: reports
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;
use crate::resilience::RetryPolicy;
use crate::workflow::{FailurePolicy, FALLBACK_CHECK};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {0}")]
    Invalid(String),
}

/// Serde adapter for durations written as "10s", "2m", "500ms".
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub provider: ProviderSettings,
    pub retry: RetryPolicy,
    pub invoker: InvokerSettings,
    pub budget: BudgetSettings,
    pub workflow: WorkflowSettings,
    pub output: OutputSettings,
}

/// Backend selection and completion parameters.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider type: "anthropic" or "gemini"
    #[serde(rename = "type")]
    pub kind: String,

    /// Model id; the provider's default when absent
    pub model: Option<String>,

    /// API key; the provider's environment variable when absent
    pub api_key: Option<String>,

    pub base_url: Option<String>,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    pub max_tokens: u32,

    pub temperature: f32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            kind: "gemini".to_string(),
            model: None,
            api_key: None,
            base_url: None,
            timeout: completion.timeout,
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ProviderSettings {
    /// Completion parameters, with `default_model` filling a missing model.
    pub fn completion_config(&self, default_model: &str) -> CompletionConfig {
        CompletionConfig {
            model: self
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerSettings {
    /// Backend rounds allowed for tool use before a call fails
    pub max_tool_rounds: usize,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self { max_tool_rounds: 5 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    /// Global token ceiling for a run; unlimited when absent
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub failure_policy: FailurePolicy,

    /// Check audited when decomposition yields nothing usable
    pub fallback_check: String,

    /// Directory of evidence documents loaded into the store
    pub docs_dir: Option<PathBuf>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            fallback_check: FALLBACK_CHECK.to_string(),
            docs_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub json_file: String,
    pub csv_file: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            json_file: "audit_report.json".to_string(),
            csv_file: "audit_report.csv".to_string(),
        }
    }
}

impl AuditConfig {
    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document; treat it as all defaults
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.kind.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.type must not be empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.invoker.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid("invoker.max_tool_rounds must be at least 1".into()));
        }
        if self.workflow.fallback_check.trim().is_empty() {
            return Err(ConfigError::Invalid("workflow.fallback_check must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid(format!(
                "provider.temperature {} is outside 0.0..=2.0",
                self.provider.temperature
            )));
        }
        Ok(())
    }
}
