//! Secure credential handling for LLM providers.
//!
//! API keys are wrapped in [`ApiCredential`] as soon as they are read, so
//! they never show up in `Debug`/`Display` output, logs or error messages.
//!
//! ```ignore
//! let cred = ApiCredential::resolve(file_key, "OPENAI_API_KEY", &lookup, "OpenAI API key");
//!
//! // Use in HTTP header (explicit exposure)
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Config file
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// `Debug` and `Display` show `[REDACTED]`; the value is zeroed on drop and
/// only reachable through [`ApiCredential::expose`].
#[derive(Clone)]
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a raw value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Pick the config file value, else the environment variable.
    ///
    /// Empty strings count as unset. Returns `None` when neither source has a
    /// value; whether that is an error depends on which provider is selected.
    pub fn resolve<F>(
        configured: Option<String>,
        env_var: &str,
        lookup: &F,
        name: &'static str,
    ) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = configured.filter(|v| !v.is_empty()) {
            return Some(Self::new(value, CredentialSource::Config, name));
        }

        lookup(env_var)
            .filter(|v| !v.is_empty())
            .map(|value| Self::new(value, CredentialSource::Environment, name))
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the value is sent (an HTTP header or query
    /// parameter). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Human-readable name, e.g. "OpenAI API key".
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
