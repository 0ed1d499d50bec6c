//! Backend API keys.
//!
//! A key is wrapped in `secrecy` as soon as it is read and is exposed only
//! where it goes on the wire, so it never reaches logs, trace metadata or
//! exported reports.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// `provider.api_key` in the audit config
    Config,
    /// The backend's environment variable, possibly set from `.env`
    Environment,
    Programmatic,
}

pub struct ApiKey {
    value: SecretString,
    source: KeySource,
    label: &'static str,
}

impl ApiKey {
    pub fn new(value: impl Into<String>, source: KeySource, label: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            label,
        }
    }

    /// The configured key when it is non-blank, otherwise `env_var`.
    pub fn resolve(
        configured: Option<&str>,
        env_var: &str,
        label: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = configured.filter(|v| !v.trim().is_empty()) {
            return Ok(Self::new(value, KeySource::Config, label));
        }
        match std::env::var(env_var) {
            Ok(value) if !value.trim().is_empty() => {
                Ok(Self::new(value, KeySource::Environment, label))
            }
            _ => Err(ProviderError::NotConfigured(format!(
                "{} missing: set provider.api_key or {}",
                label, env_var
            ))),
        }
    }

    /// Only call where the key is put on the wire.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, [REDACTED])", self.label, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_redacted_in_debug() {
        let key = ApiKey::new("AIza-secret-123", KeySource::Config, "Gemini API key");
        let debug = format!("{:?}", key);
        assert_eq!(debug, "Gemini API key (Config, [REDACTED])");
        assert_eq!(key.expose(), "AIza-secret-123");
    }

    #[test]
    fn test_configured_key_wins() {
        std::env::set_var("VERITRACE_TEST_KEY_PRIORITY", "env-key");
        let key = ApiKey::resolve(Some("config-key"), "VERITRACE_TEST_KEY_PRIORITY", "Test key").unwrap();
        std::env::remove_var("VERITRACE_TEST_KEY_PRIORITY");

        assert_eq!(key.expose(), "config-key");
        assert_eq!(key.source(), KeySource::Config);
    }

    #[test]
    fn test_blank_configured_key_reads_env() {
        std::env::set_var("VERITRACE_TEST_KEY_FALLBACK", "env-key");
        let key = ApiKey::resolve(Some("  "), "VERITRACE_TEST_KEY_FALLBACK", "Test key").unwrap();
        std::env::remove_var("VERITRACE_TEST_KEY_FALLBACK");

        assert_eq!(key.expose(), "env-key");
        assert_eq!(key.source(), KeySource::Environment);
    }

    #[test]
    fn test_missing_key_names_both_places() {
        let err = ApiKey::resolve(None, "VERITRACE_NONEXISTENT_VAR", "Test key").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("provider.api_key"));
        assert!(message.contains("VERITRACE_NONEXISTENT_VAR"));
    }
}
