//! Scripted provider and OCR engine for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::ocr::{OcrEngine, OcrError};
use crate::orchestrator::Orchestrator;
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

type Reply = dyn Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync;

/// Provider answering every call through a closure over the messages.
pub struct StubProvider {
    reply: Box<Reply>,
    images: bool,
    calls: Mutex<Vec<(Vec<ChatMessage>, CompletionConfig)>>,
}

impl StubProvider {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            images: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn fixed(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn without_images(mut self) -> Self {
        self.images = false;
        self
    }

    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, CompletionConfig)> {
        self.calls.lock().clone()
    }

    /// User prompt of every call, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|(messages, _)| messages.into_iter().find(|m| m.role == "user"))
            .map(|m| m.content)
            .collect()
    }
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let content = (self.reply)(&messages)?;
        self.calls.lock().push((messages, config.clone()));
        Ok(CompletionResponse {
            content,
            usage: TokenUsage::default(),
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn default_model(&self) -> &str {
        "stub-model"
    }

    fn supports_images(&self) -> bool {
        self.images
    }
}

/// OCR engine returning the canned text indexed by the image's trailing byte.
pub struct StubOcr {
    pub texts: Vec<&'static str>,
}

#[async_trait]
impl OcrEngine for StubOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        // Tests tag images by their trailing byte.
        let index = image.last().copied().unwrap_or(0) as usize;
        Ok(self.texts.get(index).copied().unwrap_or("").to_string())
    }
}

/// Orchestrator over a stub, with direct image analysis switched off.
pub fn orchestrator(provider: Arc<StubProvider>) -> Orchestrator {
    let config = RuntimeConfig {
        direct_image_analysis: false,
        ..RuntimeConfig::default()
    };
    Orchestrator::new(provider, config)
}

/// The bundled sample document as raw JSON text.
pub const SAMPLE_JSON: &str = include_str!("../../histnote-core/testdata/cach_mang_thang_tam.json");
