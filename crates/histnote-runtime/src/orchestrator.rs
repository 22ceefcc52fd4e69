//! Runtime orchestrator for history document generation.
//!
//! Ties the provider to the deterministic pipeline in `histnote-core`:
//! - Build the prompt (schema text plus OCR text, or photos)
//! - One provider call, no retry
//! - Sanitize, parse, validate; the first failure is returned as is
//!
//! Each call is independent. The orchestrator holds no mutable state, so one
//! instance can serve concurrent requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use histnote_core::{
    strip_code_fences, DocumentError, HistoryDocument, MalformedResponse, SchemaViolation,
};

use crate::config::{ConfigError, RuntimeConfig};
use crate::notes::{NoteImage, NotesInput};
use crate::ocr::{OcrEngine, OcrError};
use crate::prompts;
use crate::providers::{
    ChatMessage, CompletionConfig, LlmProvider, ProviderError, ProviderRegistry,
};

/// Temperature for schema-bound JSON requests.
const JSON_TEMPERATURE: f32 = 0.2;
/// Temperature for free-text answers.
const CHAT_TEMPERATURE: f32 = 0.4;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),

    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    #[error("LLM provider call failed: {0}")]
    UpstreamProvider(ProviderError),

    #[error("OCR could not read content")]
    EmptyOcr,

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<ProviderError> for RuntimeError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured(msg) => RuntimeError::Configuration(msg),
            other => RuntimeError::UpstreamProvider(other),
        }
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(e: ConfigError) -> Self {
        RuntimeError::Configuration(e.to_string())
    }
}

impl From<DocumentError> for RuntimeError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Malformed(e) => RuntimeError::MalformedResponse(e),
            DocumentError::Schema(e) => RuntimeError::SchemaViolation(e),
        }
    }
}

/// A generated document plus what it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub document: HistoryDocument,

    /// Combined OCR text; empty when photos went straight to the model.
    pub ocr_text: String,

    pub analyzed_at: DateTime<Utc>,
}

/// The runtime orchestrator.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    config: RuntimeConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.default_model())
            .field("direct_image_analysis", &self.config.direct_image_analysis)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator over an existing provider.
    pub fn new(provider: Arc<dyn LlmProvider>, config: RuntimeConfig) -> Self {
        Self { provider, config }
    }

    /// Build the provider named in `config` and wrap it.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let provider = ProviderRegistry::with_defaults().create_selected(&config)?;
        Ok(Self::new(provider, config))
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn completion_config(&self, json_mode: bool) -> CompletionConfig {
        CompletionConfig {
            model: self.provider.default_model().to_string(),
            temperature: if json_mode { JSON_TEMPERATURE } else { CHAT_TEMPERATURE },
            timeout: self.config.request_timeout,
            json_mode,
            ..Default::default()
        }
    }

    /// One JSON-mode call; returns the raw text.
    pub(crate) async fn complete_json(&self, message: ChatMessage) -> Result<String, RuntimeError> {
        let messages = vec![ChatMessage::system(prompts::JSON_SYSTEM_PROMPT), message];
        self.call(messages, self.completion_config(true)).await
    }

    /// One free-text call; returns the raw text.
    pub(crate) async fn complete_text(&self, prompt: String) -> Result<String, RuntimeError> {
        let messages = vec![
            ChatMessage::system(prompts::CHAT_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        self.call(messages, self.completion_config(false)).await
    }

    async fn call(
        &self,
        messages: Vec<ChatMessage>,
        config: CompletionConfig,
    ) -> Result<String, RuntimeError> {
        let started = std::time::Instant::now();
        match self.provider.complete(messages, &config).await {
            Ok(response) => {
                tracing::debug!(
                    provider = self.provider.name(),
                    model = %response.model,
                    tokens = response.usage.total(),
                    elapsed = ?started.elapsed(),
                    "completion received"
                );
                Ok(response.content)
            }
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "completion failed");
                Err(e.into())
            }
        }
    }

    /// Generate a validated document from OCR text or photos.
    ///
    /// Either a fully valid document comes back or an error does; nothing is
    /// defaulted. Whitespace-only OCR text is [`RuntimeError::EmptyOcr`].
    pub async fn produce_history_document(
        &self,
        input: NotesInput,
    ) -> Result<Analysis, RuntimeError> {
        let (message, ocr_text) = match input {
            NotesInput::OcrText(text) => {
                if text.trim().is_empty() {
                    return Err(RuntimeError::EmptyOcr);
                }
                (ChatMessage::user(prompts::history_prompt(&text)), text)
            }
            NotesInput::Images(images) => {
                if images.is_empty() {
                    return Err(RuntimeError::InvalidInput("no images given".to_string()));
                }
                if !self.provider.supports_images() {
                    return Err(RuntimeError::Configuration(format!(
                        "provider {} cannot read images",
                        self.provider.name()
                    )));
                }
                let inline = images.iter().map(NoteImage::to_inline).collect();
                let prompt = prompts::image_history_prompt(images.len());
                (ChatMessage::user_with_images(prompt, inline), String::new())
            }
        };

        let raw = self.complete_json(message).await?;
        let document = histnote_core::parse_history_document(&raw).map_err(|e| {
            tracing::warn!(error = %e, "model response rejected");
            RuntimeError::from(e)
        })?;

        let warnings = document.semantic_warnings();
        if !warnings.is_empty() {
            tracing::info!(
                event = %document.event_name,
                warnings = warnings.len(),
                "document accepted with semantic warnings"
            );
        }
        tracing::info!(event = %document.event_name, "history document produced");

        Ok(Analysis {
            document,
            ocr_text,
            analyzed_at: Utc::now(),
        })
    }

    /// The full photo path.
    ///
    /// With direct analysis enabled and an image-capable provider, photos go
    /// straight to the model. Otherwise every photo is OCR'd concurrently and
    /// the texts are joined in input order, one per line.
    pub async fn analyze_images(
        &self,
        images: Vec<NoteImage>,
        ocr: &dyn OcrEngine,
    ) -> Result<Analysis, RuntimeError> {
        if images.is_empty() {
            return Err(RuntimeError::InvalidInput("no images given".to_string()));
        }

        if self.config.direct_image_analysis && self.provider.supports_images() {
            tracing::info!(images = images.len(), "analyzing photos directly");
            return self.produce_history_document(NotesInput::Images(images)).await;
        }

        tracing::info!(images = images.len(), "running OCR");
        let texts = join_all(images.iter().map(|image| ocr.recognize(image.bytes())))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let combined = texts.join("\n");
        if combined.trim().is_empty() {
            return Err(RuntimeError::EmptyOcr);
        }

        self.produce_history_document(NotesInput::OcrText(combined))
            .await
    }

    /// Short free-text answer grounded in the document.
    ///
    /// Code fences are stripped. If the model answered with a JSON object
    /// carrying a string `response` or `answer`, that string is returned.
    pub async fn chat_answer(
        &self,
        document: &HistoryDocument,
        question: &str,
    ) -> Result<String, RuntimeError> {
        if question.trim().is_empty() {
            return Err(RuntimeError::InvalidInput("question is empty".to_string()));
        }

        let raw = self
            .complete_text(prompts::chat_prompt(document, question))
            .await?;
        Ok(unwrap_answer(strip_code_fences(&raw)))
    }
}

fn unwrap_answer(cleaned: String) -> String {
    let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(&cleaned) else {
        return cleaned;
    };

    ["response", "answer"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{orchestrator, StubOcr, StubProvider, SAMPLE_JSON};
    use serde_json::json;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

    fn tagged_jpeg(tag: u8) -> NoteImage {
        let mut bytes = JPEG.to_vec();
        bytes.push(tag);
        NoteImage::from_bytes(bytes).unwrap()
    }

    fn minimal_document() -> serde_json::Value {
        json!({
            "event_name": "Cách mạng tháng Tám",
            "timeline": {"start": "14/8/1945", "end": "2/9/1945", "key_dates": []},
            "causes": [],
            "developments": [],
            "results": [],
            "significance": [],
            "related_events": [],
            "why_questions": [],
            "mini_test": {"mcq": [], "ordering": [], "short_answer": []}
        })
    }

    #[tokio::test]
    async fn test_produce_document_from_ocr_text() {
        let stub = Arc::new(StubProvider::fixed(&format!(
            "Đây là JSON:\n```json\n{}\n```",
            minimal_document()
        )));
        let orch = orchestrator(stub.clone());

        let analysis = orch
            .produce_history_document(NotesInput::OcrText(
                "Cách mạng tháng Tám 1945...".to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(analysis.document.event_name, "Cách mạng tháng Tám");
        assert!(analysis.document.causes.is_empty());
        assert_eq!(analysis.ocr_text, "Cách mạng tháng Tám 1945...");

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        let (messages, config) = &calls[0];
        assert!(config.json_mode);
        assert_eq!(config.temperature, JSON_TEMPERATURE);
        assert_eq!(config.model, "stub-model");
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("Cách mạng tháng Tám 1945..."));
        assert!(messages[1].content.contains(prompts::INSUFFICIENT_DATA));
    }

    #[tokio::test]
    async fn test_full_sample_round_trips() {
        let stub = Arc::new(StubProvider::fixed(SAMPLE_JSON));
        let analysis = orchestrator(stub)
            .produce_history_document(NotesInput::OcrText("ghi chép".to_string()))
            .await
            .unwrap();

        let expected: HistoryDocument = serde_json::from_str(SAMPLE_JSON).unwrap();
        assert_eq!(analysis.document, expected);
    }

    #[tokio::test]
    async fn test_omitted_sections_fail_validation() {
        let mut doc = minimal_document();
        doc.as_object_mut().unwrap().remove("results");
        doc.as_object_mut().unwrap().remove("significance");
        let stub = Arc::new(StubProvider::fixed(&doc.to_string()));

        let err = orchestrator(stub)
            .produce_history_document(NotesInput::OcrText("ghi chép".to_string()))
            .await
            .unwrap_err();

        match err {
            RuntimeError::SchemaViolation(v) => {
                assert_eq!(v.paths(), vec!["results", "significance"]);
            }
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_reply_is_malformed() {
        let stub = Arc::new(StubProvider::fixed("Xin lỗi, tôi không thể giúp."));
        let err = orchestrator(stub)
            .produce_history_document(NotesInput::OcrText("ghi chép".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_blank_ocr_text_is_empty_ocr() {
        let stub = Arc::new(StubProvider::fixed("{}"));
        let err = orchestrator(stub.clone())
            .produce_history_document(NotesInput::OcrText(" \n\t".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::EmptyOcr));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_provider_errors_are_classified() {
        let stub = Arc::new(StubProvider::new(|_| Err(ProviderError::AuthError)));
        let err = orchestrator(stub)
            .produce_history_document(NotesInput::OcrText("ghi chép".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::UpstreamProvider(ProviderError::AuthError)
        ));

        let err: RuntimeError = ProviderError::NotConfigured("no feature".to_string()).into();
        assert!(matches!(err, RuntimeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_ocr_texts_joined_in_input_order() {
        let stub = Arc::new(StubProvider::fixed(&minimal_document().to_string()));
        let ocr = StubOcr {
            texts: vec!["trang một", "trang hai", "trang ba"],
        };
        let images = vec![tagged_jpeg(2), tagged_jpeg(0), tagged_jpeg(1)];

        let analysis = orchestrator(stub.clone())
            .analyze_images(images, &ocr)
            .await
            .unwrap();

        assert_eq!(analysis.ocr_text, "trang ba\ntrang một\ntrang hai");
        assert!(stub.prompts()[0].contains("trang ba\ntrang một\ntrang hai"));
    }

    #[tokio::test]
    async fn test_blank_ocr_results_are_empty_ocr() {
        let stub = Arc::new(StubProvider::fixed("{}"));
        let ocr = StubOcr { texts: vec!["  ", "\n"] };
        let err = orchestrator(stub.clone())
            .analyze_images(vec![tagged_jpeg(0), tagged_jpeg(1)], &ocr)
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::EmptyOcr));
        assert_eq!(err.to_string(), "OCR could not read content");
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_direct_image_analysis_skips_ocr() {
        let stub = Arc::new(StubProvider::fixed(&minimal_document().to_string()));
        let config = RuntimeConfig {
            direct_image_analysis: true,
            ..RuntimeConfig::default()
        };
        let orch = Orchestrator::new(stub.clone(), config);
        let ocr = StubOcr { texts: vec![] };

        let analysis = orch
            .analyze_images(vec![tagged_jpeg(0), tagged_jpeg(1)], &ocr)
            .await
            .unwrap();

        assert!(analysis.ocr_text.is_empty());
        let (messages, _) = &stub.calls()[0];
        assert_eq!(messages[1].images.len(), 2);
        assert_eq!(messages[1].images[0].mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_direct_mode_falls_back_to_ocr_without_image_support() {
        let stub = Arc::new(StubProvider::fixed(&minimal_document().to_string()).without_images());
        let orch = Orchestrator::new(stub.clone(), RuntimeConfig::default());
        let ocr = StubOcr { texts: vec!["trang một"] };

        let analysis = orch.analyze_images(vec![tagged_jpeg(0)], &ocr).await.unwrap();
        assert_eq!(analysis.ocr_text, "trang một");
        assert!(stub.calls()[0].0[1].images.is_empty());
    }

    #[tokio::test]
    async fn test_no_images_is_invalid_input() {
        let stub = Arc::new(StubProvider::fixed("{}"));
        let ocr = StubOcr { texts: vec![] };
        let err = orchestrator(stub).analyze_images(vec![], &ocr).await.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_chat_answer_strips_fences() {
        let stub = Arc::new(StubProvider::fixed("```Đây là câu trả lời```"));
        let sample: HistoryDocument = serde_json::from_str(SAMPLE_JSON).unwrap();

        let answer = orchestrator(stub.clone())
            .chat_answer(&sample, "Vì sao Cách mạng tháng Tám thành công?")
            .await
            .unwrap();

        assert_eq!(answer, "Đây là câu trả lời");
        let (messages, config) = &stub.calls()[0];
        assert!(!config.json_mode);
        assert_eq!(config.temperature, CHAT_TEMPERATURE);
        assert!(messages[1].content.contains("Event: Cách mạng tháng Tám"));
        assert!(messages[1].content.contains("Câu hỏi: Vì sao Cách mạng tháng Tám thành công?"));
    }

    #[tokio::test]
    async fn test_chat_answer_unwraps_json_object() {
        let sample: HistoryDocument = serde_json::from_str(SAMPLE_JSON).unwrap();

        let stub = Arc::new(StubProvider::fixed(r#"```json
{"answer": "Nhờ thời cơ thuận lợi."}
```"#));
        let answer = orchestrator(stub).chat_answer(&sample, "Vì sao?").await.unwrap();
        assert_eq!(answer, "Nhờ thời cơ thuận lợi.");

        let stub = Arc::new(StubProvider::fixed(r#"{"response": "", "answer": "B"}"#));
        let answer = orchestrator(stub).chat_answer(&sample, "Vì sao?").await.unwrap();
        assert_eq!(answer, "B");

        let stub = Arc::new(StubProvider::fixed(r#"{"score": 7}"#));
        let answer = orchestrator(stub).chat_answer(&sample, "Vì sao?").await.unwrap();
        assert_eq!(answer, r#"{"score": 7}"#);
    }

    #[tokio::test]
    async fn test_chat_answer_rejects_blank_question() {
        let stub = Arc::new(StubProvider::fixed("x"));
        let err = orchestrator(stub)
            .chat_answer(&HistoryDocument::default(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidInput(_)));
    }
}
