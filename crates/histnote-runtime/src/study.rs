//! Study features built on a validated document.
//!
//! Grading replies are read leniently: a reply that does not parse falls back
//! to an empty or zero result instead of failing the request. Provider errors
//! still propagate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use histnote_core::{
    parse_json, sanitize_json, strip_code_fences, HistoryDocument, MiniTest, WhyQuestion,
};

use crate::orchestrator::{Orchestrator, RuntimeError};
use crate::prompts;
use crate::providers::ChatMessage;

/// Comment used when the short-answer grader's reply cannot be read.
pub const UNREADABLE_GRADE_COMMENT: &str = "Could not read the grader's response";

/// Score and comment for one why-question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhyGrade {
    pub q: String,
    pub score: f64,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortAnswerGrade {
    pub score: f64,
    pub comment: String,
}

/// Question difficulty, after Bloom's taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
}

impl BloomLevel {
    /// All levels, easiest first.
    pub const ALL: [BloomLevel; 4] = [
        BloomLevel::Remember,
        BloomLevel::Understand,
        BloomLevel::Apply,
        BloomLevel::Analyze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloomLevel::Remember => "Remember",
            BloomLevel::Understand => "Understand",
            BloomLevel::Apply => "Apply",
            BloomLevel::Analyze => "Analyze",
        }
    }
}

impl fmt::Display for BloomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloomLevel {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BloomLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RuntimeError::InvalidInput(format!("unknown Bloom level '{s}'")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TutorQuestion {
    pub level: BloomLevel,
    pub question: String,
}

/// A student's answer to a tutor question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TutorAnswer {
    pub level: BloomLevel,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TutorFeedback {
    pub level: BloomLevel,
    pub feedback: String,
}

/// Error patterns found in an essay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EssayFeedback {
    pub score: f64,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub suggest: String,
}

/// Two events side by side, or the model's text when it did not give a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Table(Value),
    Raw(String),
}

fn require_text(value: &str, what: &str) -> Result<(), RuntimeError> {
    if value.trim().is_empty() {
        return Err(RuntimeError::InvalidInput(format!("{what} is empty")));
    }
    Ok(())
}

/// Accepts `[...]` or `{"results": [...]}`; anything else reads as no grades.
fn parse_why_grades(raw: &str) -> Vec<WhyGrade> {
    let cleaned = strip_code_fences(raw);
    let value = serde_json::from_str::<Value>(&cleaned)
        .ok()
        .or_else(|| parse_json(&sanitize_json(raw)).ok());

    let items = match value {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut obj)) => match obj.remove("results") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    serde_json::from_value(Value::Array(items)).unwrap_or_default()
}

fn parse_short_answer_grade(raw: &str) -> ShortAnswerGrade {
    parse_json(&sanitize_json(raw))
        .ok()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_else(|| ShortAnswerGrade {
            score: 0.0,
            comment: UNREADABLE_GRADE_COMMENT.to_string(),
        })
}

impl Orchestrator {
    /// Grade every why-question in one request.
    ///
    /// `answers` is keyed by question index; missing answers are graded as
    /// blank. An unreadable reply yields no grades.
    pub async fn grade_why_questions(
        &self,
        questions: &[WhyQuestion],
        answers: &BTreeMap<usize, String>,
    ) -> Result<Vec<WhyGrade>, RuntimeError> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = prompts::why_grading_prompt(questions, answers);
        let raw = self.complete_json(ChatMessage::user(prompt)).await?;
        let grades = parse_why_grades(&raw);
        if grades.is_empty() {
            tracing::warn!(questions = questions.len(), "why-question grades unreadable");
        }
        Ok(grades)
    }

    /// Grade a short answer against a rubric.
    pub async fn grade_short_answer(
        &self,
        rubric: &[String],
        answer: &str,
    ) -> Result<ShortAnswerGrade, RuntimeError> {
        let prompt = prompts::short_answer_prompt(rubric, answer);
        let raw = self.complete_json(ChatMessage::user(prompt)).await?;
        Ok(parse_short_answer_grade(&raw))
    }

    /// Grade the answer to `mini_test.short_answer[index]`.
    ///
    /// An index past the end grades against an empty rubric.
    pub async fn grade_mini_test_answer(
        &self,
        mini_test: &MiniTest,
        index: usize,
        answer: &str,
    ) -> Result<ShortAnswerGrade, RuntimeError> {
        let rubric = mini_test
            .short_answer
            .get(index)
            .map(|item| item.rubric.as_slice())
            .unwrap_or(&[]);
        self.grade_short_answer(rubric, answer).await
    }

    /// One generated question per Bloom level, easiest first.
    ///
    /// The four requests run concurrently.
    pub async fn tutor_questions(
        &self,
        document: &HistoryDocument,
    ) -> Result<Vec<TutorQuestion>, RuntimeError> {
        let requests = BloomLevel::ALL.map(|level| async move {
            let question = self
                .chat_answer(document, &prompts::tutor_question_request(level))
                .await?;
            Ok::<_, RuntimeError>(TutorQuestion { level, question })
        });

        join_all(requests).await.into_iter().collect()
    }

    /// Short feedback on each answer, in input order.
    pub async fn tutor_feedback(
        &self,
        document: &HistoryDocument,
        answers: &[TutorAnswer],
    ) -> Result<Vec<TutorFeedback>, RuntimeError> {
        let requests = answers.iter().map(|item| async move {
            let feedback = self
                .chat_answer(
                    document,
                    &prompts::tutor_feedback_request(&item.question, &item.answer),
                )
                .await?;
            Ok::<_, RuntimeError>(TutorFeedback {
                level: item.level,
                feedback,
            })
        });

        join_all(requests).await.into_iter().collect()
    }

    /// Score an essay and list its error patterns.
    ///
    /// A reply that is not a feedback object becomes the suggestion text with
    /// a zero score.
    pub async fn essay_feedback(
        &self,
        document: &HistoryDocument,
        essay: &str,
    ) -> Result<EssayFeedback, RuntimeError> {
        require_text(essay, "essay")?;

        let reply = self
            .chat_answer(document, &prompts::essay_request(&document.event_name, essay))
            .await?;
        Ok(
            serde_json::from_str::<EssayFeedback>(&reply).unwrap_or_else(|_| EssayFeedback {
                score: 0.0,
                patterns: Vec::new(),
                suggest: reply,
            }),
        )
    }

    /// Compare the document's event with another one.
    pub async fn compare_events(
        &self,
        document: &HistoryDocument,
        other: &str,
    ) -> Result<Comparison, RuntimeError> {
        require_text(other, "event to compare")?;

        let reply = self
            .chat_answer(document, &prompts::compare_request(&document.event_name, other))
            .await?;
        Ok(match serde_json::from_str::<Value>(&reply) {
            Ok(table @ Value::Object(_)) => Comparison::Table(table),
            _ => Comparison::Raw(reply),
        })
    }
}
