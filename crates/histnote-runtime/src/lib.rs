//! # histnote-runtime
//!
//! Everything in histnote that talks to the outside world: LLM providers,
//! the OCR collaborator, configuration and the orchestrator.
//!
//! ## Important
//!
//! The deterministic pipeline (sanitize, parse, validate) lives in
//! `histnote-core` and never makes network calls. This crate adds one provider
//! call in front of it and turns the result into [`Analysis`] or a
//! [`RuntimeError`].
//!
//! Provider backends are behind cargo features: `openai`, `gemini`, or
//! `all-providers`. Without them the providers still construct but report
//! [`ProviderError::NotConfigured`] when called.
//!
//! ## Example
//!
//! ```rust,ignore
//! use histnote_runtime::{NotesInput, Orchestrator, RuntimeConfig};
//!
//! let orchestrator = Orchestrator::from_config(RuntimeConfig::from_env()?)?;
//! let analysis = orchestrator
//!     .produce_history_document(NotesInput::OcrText(ocr_text))
//!     .await?;
//! println!("{}", analysis.document.event_name);
//! ```

pub mod config;
pub mod notes;
pub mod ocr;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod study;
pub mod videos;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ProviderKind, ProviderSettings, RuntimeConfig};
pub use notes::{ImageFormat, NoteImage, NotesInput, MAX_IMAGE_BYTES};
pub use ocr::{OcrEngine, OcrError, TesseractOcr};
pub use orchestrator::{Analysis, Orchestrator, RuntimeError};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use study::{
    BloomLevel, Comparison, EssayFeedback, ShortAnswerGrade, TutorAnswer, TutorFeedback,
    TutorQuestion, WhyGrade,
};
pub use videos::{suggest_videos, VideoSuggestion};
