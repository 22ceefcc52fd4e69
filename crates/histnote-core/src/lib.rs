//! # histnote-core
//!
//! Deterministic half of histnote: turns an unstructured model response into
//! a validated [`HistoryDocument`].
//!
//! ## Pipeline
//!
//! 1. [`sanitize_json`] cuts prose and code fences away from the JSON payload
//! 2. [`parse_json`] parses it strictly
//! 3. [`schema::validate_history`] checks the structure and narrows the type
//!
//! The first failing stage wins; there are no partial documents. This crate
//! never makes network calls and never logs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use histnote_core::parse_history_document;
//!
//! let raw = provider_output(); // "Sure! ```json {...} ```"
//! let doc = parse_history_document(&raw)?;
//! println!("{}", doc.event_name);
//! ```

pub mod document;
pub mod parse;
pub mod sanitize;
pub mod schema;

pub use document::{
    Choice, ChoiceId, DevelopmentStep, HistoryDocument, KeyDate, KnowledgeItem, McqItem,
    MiniTest, OrderingItem, RelatedEvent, SemanticWarning, ShortAnswerItem, Timeline,
    WhyQuestion,
};
pub use parse::{parse_json, MalformedResponse};
pub use sanitize::{sanitize_json, strip_code_fences};
pub use schema::{SchemaViolation, Violation, ViolationKind};

use thiserror::Error;

/// Why a raw response could not become a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

/// Run sanitize, parse and validate on a raw model response.
pub fn parse_history_document(raw: &str) -> Result<HistoryDocument, DocumentError> {
    let cleaned = sanitize_json(raw);
    let value = parse_json(&cleaned)?;
    Ok(schema::validate_history(value)?)
}
