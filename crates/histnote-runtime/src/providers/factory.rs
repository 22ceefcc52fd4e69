//! Provider factory pattern for selecting the LLM backend by name.
//!
//! Each backend registers a factory that builds a provider from the
//! [`RuntimeConfig`]. The registry resolves the name from configuration
//! (`openai`, `gemini`) to a ready provider.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create_selected(&config)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::LlmProvider;
use crate::config::{ConfigError, ProviderKind, RuntimeConfig};

/// Factory for creating LLM providers from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Backend this factory builds.
    fn kind(&self) -> ProviderKind;

    /// Create a provider instance.
    ///
    /// Fails with [`ConfigError::MissingCredential`] when the backend's key
    /// is absent from both the config file and the environment.
    fn create(&self, config: &RuntimeConfig) -> Result<Arc<dyn LlmProvider>, ConfigError>;
}

/// Registry of available provider factories, keyed by provider name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory for the same backend already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.kind().as_str().to_string(), factory);
    }

    /// Create a provider from its name.
    pub fn create(
        &self,
        provider_type: &str,
        config: &RuntimeConfig,
    ) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        let key = provider_type.trim().to_ascii_lowercase();
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| ConfigError::UnknownProvider(provider_type.to_string()))?;

        let provider = factory.create(config)?;
        tracing::debug!(provider = %key, model = provider.default_model(), "provider created");
        Ok(provider)
    }

    /// Create the provider named by `config.provider`.
    pub fn create_selected(&self, config: &RuntimeConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        self.create(config.provider.as_str(), config)
    }

    /// List available provider types.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    /// Check if a provider type is registered.
    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Create a registry with both built-in backends registered.
    ///
    /// Without the matching cargo feature a backend still registers, but its
    /// `complete` reports [`super::ProviderError::NotConfigured`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry.register(Arc::new(super::GeminiProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
