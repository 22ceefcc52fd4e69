//! OpenAI chat completions provider.
//!
//! Supports JSON mode for document generation and `image_url` content parts
//! for analyzing note photos directly.

use super::{
    factory::ProviderFactory, secrets::ApiCredential, ChatMessage, CompletionConfig,
    CompletionResponse, LlmProvider, ProviderError,
};
use crate::config::{ConfigError, ProviderKind, RuntimeConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// OpenAI provider.
///
/// The API key lives in an [`ApiCredential`] and is only exposed when the
/// `Authorization` header is set.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    #[cfg(feature = "openai")]
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(
        credential: ApiCredential,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        #[cfg(feature = "openai")]
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;
        #[cfg(not(feature = "openai"))]
        let _ = timeout;

        Ok(Self {
            credential,
            base_url: base_url.into(),
            model: model.into(),
            #[cfg(feature = "openai")]
            client,
        })
    }

    /// Create from the OpenAI section of the runtime config.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        let credential = config.require_credential(ProviderKind::OpenAi)?.clone();
        Self::new(
            credential,
            config.openai.model.clone(),
            config.openai.base_url.clone(),
            config.request_timeout,
        )
        .map_err(|e| ConfigError::Provider(e.to_string()))
    }
}

/// OpenAI API request format.
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: MessageContent,
}

/// Plain string for text-only messages, part list when images are attached.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "openai"), allow(dead_code))]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg_attr(not(feature = "openai"), allow(dead_code))]
fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> OpenAiRequest {
    let messages = messages
        .into_iter()
        .map(|msg| {
            let content = if msg.images.is_empty() {
                MessageContent::Text(msg.content)
            } else {
                let mut parts = vec![ContentPart::Text { text: msg.content }];
                parts.extend(msg.images.iter().map(|image| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                }));
                MessageContent::Parts(parts)
            };
            OpenAiMessage {
                role: msg.role,
                content,
            }
        })
        .collect();

    OpenAiRequest {
        model: config.model.clone(),
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        response_format: config.json_mode.then_some(ResponseFormat {
            type_: "json_object",
        }),
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    #[cfg(feature = "openai")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        tracing::debug!(model = %request.model, messages = request.messages.len(), "openai request");

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| super::http_error(e, config.timeout))?;

        let body: OpenAiResponse = super::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let usage = body.usage.map_or_else(Default::default, |u| super::TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        let (content, stop_reason) = body
            .choices
            .into_iter()
            .next()
            .map(|choice| (choice.message.content.unwrap_or_default(), choice.finish_reason))
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage,
            model: body.model,
            stop_reason,
        })
    }

    #[cfg(not(feature = "openai"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "OpenAI provider requires 'openai' feature".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn supports_images(&self) -> bool {
        true
    }
}

/// Factory for creating OpenAI providers from configuration.
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn create(&self, config: &RuntimeConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CredentialSource, InlineImage};

    fn provider(key: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            ApiCredential::new(key, CredentialSource::Programmatic, "OpenAI API key"),
            "gpt-4o-mini",
            "https://api.openai.com/v1",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = provider("test-key");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o-mini");
        assert!(provider.supports_images());
    }

    #[test]
    fn test_json_mode_request() {
        let config = CompletionConfig {
            json_mode: true,
            ..Default::default()
        };
        let request = build_request(
            vec![ChatMessage::system("Chỉ trả JSON."), ChatMessage::user("OCR: ...")],
            &config,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "OCR: ...");
    }

    #[test]
    fn test_plain_request_omits_response_format() {
        let request = build_request(vec![ChatMessage::user("hi")], &CompletionConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_images_become_content_parts() {
        let image = InlineImage {
            mime_type: "image/jpeg".to_string(),
            base64: "AAAA".to_string(),
        };
        let request = build_request(
            vec![ChatMessage::user_with_images("Đọc ghi chép", vec![image])],
            &CompletionConfig::default(),
        );
        let json = serde_json::to_value(&request).unwrap();
        let parts = json["messages"][0]["content"].as_array().unwrap();

        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "Đọc ghi chép");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_factory_requires_credential() {
        let factory = OpenAiProviderFactory;
        let err = factory.create(&RuntimeConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_factory_create_with_api_key() {
        let mut config = RuntimeConfig::default();
        config.openai.credential = Some(ApiCredential::new(
            "test-api-key",
            CredentialSource::Config,
            "OpenAI API key",
        ));
        let provider = OpenAiProviderFactory.create(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-proj-super-secret-key-12345";
        let provider = provider(secret_key);
        let debug_output = format!("{:?}", provider);

        assert!(
            !debug_output.contains(secret_key),
            "API key was exposed in Debug output!"
        );
        assert!(debug_output.contains("[REDACTED]"));
    }
}
