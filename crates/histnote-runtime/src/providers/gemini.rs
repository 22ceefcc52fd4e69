//! Google Gemini `generateContent` provider.
//!
//! Gemini has no system role in `contents`, so system messages are folded
//! into the first user turn. Images travel as `inlineData` parts.

use super::{
    factory::ProviderFactory, secrets::ApiCredential, ChatMessage, CompletionConfig,
    CompletionResponse, LlmProvider, ProviderError,
};
use crate::config::{ConfigError, ProviderKind, RuntimeConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Gemini provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    #[cfg(feature = "gemini")]
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(
        credential: ApiCredential,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        #[cfg(feature = "gemini")]
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;
        #[cfg(not(feature = "gemini"))]
        let _ = timeout;

        Ok(Self {
            credential,
            base_url: base_url.into(),
            model: model.into(),
            #[cfg(feature = "gemini")]
            client,
        })
    }

    /// Create from the Gemini section of the runtime config.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        let credential = config.require_credential(ProviderKind::Gemini)?.clone();
        Self::new(
            credential,
            config.gemini.model.clone(),
            config.gemini.base_url.clone(),
            config.request_timeout,
        )
        .map_err(|e| ConfigError::Provider(e.to_string()))
    }
}

/// Gemini API request format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

/// Gemini API response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(not(feature = "gemini"), allow(dead_code))]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(not(feature = "gemini"), allow(dead_code))]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "gemini"), allow(dead_code))]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "gemini"), allow(dead_code))]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(not(feature = "gemini"), allow(dead_code))]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[cfg_attr(not(feature = "gemini"), allow(dead_code))]
fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> GeminiRequest {
    let mut system = Vec::new();
    let mut contents: Vec<GeminiContent> = Vec::new();

    for msg in messages {
        if msg.role == "system" {
            system.push(msg.content);
            continue;
        }

        let role = if msg.role == "assistant" { "model" } else { "user" };
        let mut parts = vec![GeminiPart::Text { text: msg.content }];
        parts.extend(msg.images.into_iter().map(|image| GeminiPart::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type,
                data: image.base64,
            },
        }));
        contents.push(GeminiContent { role, parts });
    }

    if !system.is_empty() {
        let preamble = system.join("\n\n");
        match contents.iter_mut().find(|c| c.role == "user") {
            Some(first_user) => {
                if let Some(GeminiPart::Text { text }) = first_user.parts.first_mut() {
                    *text = format!("{}\n\n{}", preamble, text);
                }
            }
            None => contents.insert(
                0,
                GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart::Text { text: preamble }],
                },
            ),
        }
    }

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            response_mime_type: config.json_mode.then_some("application/json"),
        },
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    #[cfg(feature = "gemini")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        tracing::debug!(model = %config.model, contents = request.contents.len(), "gemini request");

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, config.model
            ))
            .header("x-goog-api-key", self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| super::http_error(e, config.timeout))?;

        let body: GeminiResponse = super::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let usage = body
            .usage_metadata
            .map_or_else(Default::default, |u| super::TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            });

        let (content, stop_reason) = body
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                let text = candidate
                    .content
                    .map(|c| {
                        c.parts
                            .into_iter()
                            .filter_map(|p| p.text)
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                (text, candidate.finish_reason)
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model_version.unwrap_or_else(|| config.model.clone()),
            stop_reason,
        })
    }

    #[cfg(not(feature = "gemini"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Gemini provider requires 'gemini' feature".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn supports_images(&self) -> bool {
        true
    }
}

/// Factory for creating Gemini providers from configuration.
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn create(&self, config: &RuntimeConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    }
}
