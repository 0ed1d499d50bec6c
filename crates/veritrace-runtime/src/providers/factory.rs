//! Turning the `provider` config section into a ready backend.
//!
//! ```ignore
//! let backend = ProviderRegistry::with_defaults().resolve(&config.provider)?;
//! let workflow = AuditWorkflow::from_config(backend.provider, backend.completion, &config, store);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{CompletionConfig, LlmProvider, ProviderError};
use crate::config::ProviderSettings;

/// Builds one kind of backend.
pub trait ProviderFactory: Send + Sync {
    /// Value of `provider.type` this factory answers to.
    fn provider_type(&self) -> &'static str;

    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Model used when `provider.model` is absent.
    fn default_model(&self) -> &'static str;
}

/// A provider together with the completion parameters to call it with.
pub struct Backend {
    pub provider: Arc<dyn LlmProvider>,
    pub completion: CompletionConfig,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("provider", &self.provider.name())
            .field("completion", &self.completion)
            .finish()
    }
}

/// Provider factories keyed by type name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicProviderFactory));
        #[cfg(feature = "gemini")]
        registry.register(Arc::new(super::GeminiProviderFactory));
        registry
    }

    /// Add a factory, replacing one of the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    pub fn available_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Build the backend named by `settings.kind`, filling a missing model
    /// with that backend's default.
    pub fn resolve(&self, settings: &ProviderSettings) -> Result<Backend, ProviderError> {
        let factory = self.factories.get(settings.kind.as_str()).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "unknown provider type '{}', available: {:?}",
                settings.kind,
                self.available_types()
            ))
        })?;

        if let Some(url) = &settings.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(format!(
                    "provider.base_url '{}' must start with http:// or https://",
                    url
                )));
            }
        }

        Ok(Backend {
            provider: factory.create(settings)?,
            completion: settings.completion_config(factory.default_model()),
        })
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionRequest, CompletionResponse};
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse::text_reply("ok", request.config.model.clone()))
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct EchoFactory;

    impl ProviderFactory for EchoFactory {
        fn provider_type(&self) -> &'static str {
            "echo"
        }

        fn create(&self, _settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            Ok(Arc::new(EchoProvider))
        }

        fn default_model(&self) -> &'static str {
            "echo-1"
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry
    }

    fn settings(kind: &str) -> ProviderSettings {
        ProviderSettings {
            kind: kind.into(),
            ..ProviderSettings::default()
        }
    }

    #[test]
    fn test_resolve_fills_default_model() {
        let backend = registry().resolve(&settings("echo")).unwrap();
        assert_eq!(backend.provider.name(), "echo");
        assert_eq!(backend.completion.model, "echo-1");
    }

    #[test]
    fn test_resolve_keeps_configured_model() {
        let mut settings = settings("echo");
        settings.model = Some("echo-large".into());
        let backend = registry().resolve(&settings).unwrap();
        assert_eq!(backend.completion.model, "echo-large");
    }

    #[test]
    fn test_unknown_type_lists_available() {
        let err = registry().resolve(&settings("openai")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'openai'"));
        assert!(message.contains("echo"));
    }

    #[test]
    fn test_base_url_scheme_checked() {
        let mut settings = settings("echo");
        settings.base_url = Some("ftp://nope".into());
        assert!(matches!(
            registry().resolve(&settings),
            Err(ProviderError::NotConfigured(_))
        ));

        settings.base_url = Some("https://proxy.internal/v1".into());
        assert!(registry().resolve(&settings).is_ok());
    }
}
