//! Structural validation of parsed model output.
//!
//! The schema is data ([`Shape`]) and a single walker checks it, collecting
//! every violation instead of stopping at the first one. Only structure is
//! checked: types, required fields and enum membership. Whether an MCQ answer
//! names an existing choice, or an ordering answer is a real permutation, is
//! left to [`HistoryDocument::semantic_warnings`].

mod history;
mod shape;

pub use history::{HISTORY_SCHEMA, MINI_TEST_SCHEMA, WHY_QUESTIONS_SCHEMA};
pub use shape::{Field, Shape, Violation, ViolationKind};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::document::{HistoryDocument, MiniTest, WhyQuestion};

/// The parsed JSON did not match the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("JSON does not match the schema: {}", summarize(.violations))]
pub struct SchemaViolation {
    pub violations: Vec<Violation>,
}

impl SchemaViolation {
    /// Paths of all violations, in walk order.
    pub fn paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.path.as_str()).collect()
    }

    /// The violation reported at `path`, if any.
    pub fn at(&self, path: &str) -> Option<&Violation> {
        self.violations.iter().find(|v| v.path == path)
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check `value` against `shape`, then convert it to `T`.
pub fn validate_as<T: DeserializeOwned>(shape: &Shape, value: Value) -> Result<T, SchemaViolation> {
    let violations = shape.violations(&value);
    if !violations.is_empty() {
        return Err(SchemaViolation { violations });
    }

    serde_json::from_value(value).map_err(|e| SchemaViolation {
        violations: vec![Violation {
            path: String::new(),
            kind: ViolationKind::Rejected(e.to_string()),
        }],
    })
}

/// Validate a complete knowledge frame.
pub fn validate_history(value: Value) -> Result<HistoryDocument, SchemaViolation> {
    validate_as(&HISTORY_SCHEMA, value)
}

/// Validate a standalone `why_questions` array.
pub fn validate_why_questions(value: Value) -> Result<Vec<WhyQuestion>, SchemaViolation> {
    validate_as(&WHY_QUESTIONS_SCHEMA, value)
}

/// Validate a standalone `mini_test` object.
pub fn validate_mini_test(value: Value) -> Result<MiniTest, SchemaViolation> {
    validate_as(&MINI_TEST_SCHEMA, value)
}
