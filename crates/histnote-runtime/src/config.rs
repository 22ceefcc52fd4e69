//! Runtime configuration.
//!
//! Built once at process start and passed by reference. Values come from an
//! optional YAML file; anything the file leaves out falls back to environment
//! variables, then to defaults.
//!
//! ```yaml
//! provider: gemini
//! request_timeout: 45s
//! direct_image_analysis: false
//! openai:
//!   model: gpt-4o-mini
//! gemini:
//!   api_key: "..."        # or GEMINI_API_KEY
//!   model: gemini-1.5-flash
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::providers::secrets::ApiCredential;

pub const PROVIDER_ENV: &str = "HISTNOTE_PROVIDER";
/// Accepted for compatibility with older deployments.
pub const LEGACY_PROVIDER_ENV: &str = "LLM_PROVIDER";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";
pub const DIRECT_IMAGE_ENV: &str = "USE_DIRECT_IMAGE_ANALYZE";
pub const TIMEOUT_ENV: &str = "HISTNOTE_REQUEST_TIMEOUT";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown provider '{0}': expected openai or gemini")]
    UnknownProvider(String),

    #[error("{name} required for provider {provider}: set '{provider}.api_key' in config or {env_var}")]
    MissingCredential {
        provider: ProviderKind,
        name: &'static str,
        env_var: &'static str,
    },

    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("Invalid base_url '{0}': must start with http:// or https://")]
    InvalidBaseUrl(String),

    #[error("Provider setup failed: {0}")]
    Provider(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// The two supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Per-backend settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// `None` when neither the file nor the environment supplies a key.
    pub credential: Option<ApiCredential>,
    pub model: String,
    pub base_url: String,
}

/// Resolved configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Selected backend.
    pub provider: ProviderKind,
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    /// Per-call HTTP timeout applied by the provider client.
    pub request_timeout: Duration,
    /// Send note images straight to the model instead of running OCR first.
    pub direct_image_analysis: bool,
}

/// On-disk layout. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    provider: Option<String>,
    request_timeout: Option<String>,
    direct_image_analysis: Option<bool>,
    #[serde(default)]
    openai: FileProviderSettings,
    #[serde(default)]
    gemini: FileProviderSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileProviderSettings {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
}

impl RuntimeConfig {
    /// Load from process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Load from a YAML string with environment fallback.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = serde_yaml::from_str(yaml)?;
        Self::from_lookup(file, |key| std::env::var(key).ok())
    }

    /// Load from a YAML file with environment fallback.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load from a YAML string with a custom environment lookup.
    pub fn from_yaml_with<F>(yaml: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = serde_yaml::from_str(yaml)?;
        Self::from_lookup(file, lookup)
    }

    fn from_lookup<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset, in the file and in the environment.
        let lookup = |key: &str| present(lookup(key));

        let provider = present(file.provider)
            .or_else(|| lookup(PROVIDER_ENV))
            .or_else(|| lookup(LEGACY_PROVIDER_ENV))
            .map(|name| name.parse::<ProviderKind>())
            .transpose()?
            .unwrap_or(ProviderKind::OpenAi);

        let request_timeout = match present(file.request_timeout).or_else(|| lookup(TIMEOUT_ENV)) {
            Some(value) => humantime::parse_duration(&value).map_err(|e| {
                ConfigError::InvalidDuration {
                    value,
                    reason: e.to_string(),
                }
            })?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        // Anything but an explicit "false" keeps direct analysis on.
        let direct_image_analysis = file
            .direct_image_analysis
            .unwrap_or_else(|| lookup(DIRECT_IMAGE_ENV).as_deref() != Some("false"));

        let openai = ProviderSettings {
            credential: ApiCredential::resolve(
                file.openai.api_key,
                OPENAI_API_KEY_ENV,
                &lookup,
                "OpenAI API key",
            ),
            model: present(file.openai.model)
                .or_else(|| lookup(OPENAI_MODEL_ENV))
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: validate_base_url(present(file.openai.base_url), DEFAULT_OPENAI_BASE_URL)?,
        };

        let gemini = ProviderSettings {
            credential: ApiCredential::resolve(
                file.gemini.api_key,
                GEMINI_API_KEY_ENV,
                &lookup,
                "Gemini API key",
            ),
            model: present(file.gemini.model)
                .or_else(|| lookup(GEMINI_MODEL_ENV))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            base_url: validate_base_url(present(file.gemini.base_url), DEFAULT_GEMINI_BASE_URL)?,
        };

        Ok(Self {
            provider,
            openai,
            gemini,
            request_timeout,
            direct_image_analysis,
        })
    }

    /// Switch the selected backend, e.g. from a command-line flag.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Settings of the given backend.
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    /// Settings of the selected backend.
    pub fn selected(&self) -> &ProviderSettings {
        self.settings(self.provider)
    }

    /// Credential of the given backend, or a configuration error.
    pub fn require_credential(&self, kind: ProviderKind) -> Result<&ApiCredential, ConfigError> {
        let (name, env_var) = match kind {
            ProviderKind::OpenAi => ("OpenAI API key", OPENAI_API_KEY_ENV),
            ProviderKind::Gemini => ("Gemini API key", GEMINI_API_KEY_ENV),
        };
        self.settings(kind)
            .credential
            .as_ref()
            .ok_or(ConfigError::MissingCredential {
                provider: kind,
                name,
                env_var,
            })
    }
}

impl Default for RuntimeConfig {
    /// Defaults with no credentials; only useful with injected providers.
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            openai: ProviderSettings {
                credential: None,
                model: DEFAULT_OPENAI_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            },
            gemini: ProviderSettings {
                credential: None,
                model: DEFAULT_GEMINI_MODEL.to_string(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            },
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            direct_image_analysis: true,
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_base_url(configured: Option<String>, default: &str) -> Result<String, ConfigError> {
    match configured {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(url.trim_end_matches('/').to_string())
        }
        Some(url) => Err(ConfigError::InvalidBaseUrl(url)),
        None => Ok(default.to_string()),
    }
}
