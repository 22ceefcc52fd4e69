//! The history knowledge frame.
//!
//! A `HistoryDocument` is built exactly once per analysis, entirely from the
//! model's JSON output, after [`crate::schema`] has accepted it. Field names
//! match the wire format (snake_case) so documents serialize back to the same
//! shape they were parsed from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiple-choice identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChoiceId {
    A,
    B,
    C,
    D,
}

impl ChoiceId {
    /// All identifiers, in display order.
    pub const ALL: [ChoiceId; 4] = [ChoiceId::A, ChoiceId::B, ChoiceId::C, ChoiceId::D];

    /// Wire values accepted by the schema.
    pub const WIRE_VALUES: &'static [&'static str] = &["A", "B", "C", "D"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceId::A => "A",
            ChoiceId::B => "B",
            ChoiceId::C => "C",
            ChoiceId::D => "D",
        }
    }
}

impl fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dated milestone on the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDate {
    pub date: String,
    pub note: String,
}

/// Start/end of the event plus notable dates in between.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Timeline {
    /// `None` when the notes do not say when the event began.
    pub start: Option<String>,
    pub end: Option<String>,
    pub key_dates: Vec<KeyDate>,
}

/// Entry of the causes, results and significance sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeItem {
    pub title: String,
    pub details: Vec<String>,
}

/// Entry of the developments section. Same shape as [`KnowledgeItem`] but
/// labelled by `step`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DevelopmentStep {
    pub step: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedEvent {
    pub name: String,
    pub relation: String,
}

/// Open "why" question with the points a good answer should cover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhyQuestion {
    pub q: String,
    pub expected_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub id: ChoiceId,
    pub text: String,
}

/// Multiple-choice question.
///
/// `answer` is expected to match the `id` of one of `choices`. That is a
/// property of the model output, not something validation enforces; see
/// [`HistoryDocument::semantic_warnings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McqItem {
    pub q: String,
    pub choices: Vec<Choice>,
    pub answer: ChoiceId,
    pub explain: String,
}

/// Put-in-order question.
///
/// `answer_order` is expected to be a permutation of `0..items.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderingItem {
    pub q: String,
    pub items: Vec<String>,
    pub answer_order: Vec<i64>,
    pub explain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortAnswerItem {
    pub q: String,
    pub rubric: Vec<String>,
}

/// The three quiz kinds generated alongside the knowledge frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MiniTest {
    pub mcq: Vec<McqItem>,
    pub ordering: Vec<OrderingItem>,
    pub short_answer: Vec<ShortAnswerItem>,
}

/// A validated knowledge frame for one historical event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HistoryDocument {
    pub event_name: String,
    pub timeline: Timeline,
    pub causes: Vec<KnowledgeItem>,
    pub developments: Vec<DevelopmentStep>,
    pub results: Vec<KnowledgeItem>,
    pub significance: Vec<KnowledgeItem>,
    pub related_events: Vec<RelatedEvent>,
    pub why_questions: Vec<WhyQuestion>,
    pub mini_test: MiniTest,
}

/// A semantic inconsistency in an otherwise well-shaped document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticWarning {
    /// `mini_test.mcq[index].answer` names no choice.
    AnswerNotAmongChoices { index: usize, answer: ChoiceId },
    /// `mini_test.ordering[index].answer_order` is not a permutation of the item indices.
    OrderNotPermutation { index: usize },
}

impl fmt::Display for SemanticWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticWarning::AnswerNotAmongChoices { index, answer } => write!(
                f,
                "mini_test.mcq[{}].answer: {} does not match any choice id",
                index, answer
            ),
            SemanticWarning::OrderNotPermutation { index } => write!(
                f,
                "mini_test.ordering[{}].answer_order: not a permutation of item indices",
                index
            ),
        }
    }
}

impl HistoryDocument {
    /// Report semantic inconsistencies in the quiz content.
    ///
    /// Advisory only: validation accepts documents with these problems.
    pub fn semantic_warnings(&self) -> Vec<SemanticWarning> {
        let mut warnings = Vec::new();

        for (index, item) in self.mini_test.mcq.iter().enumerate() {
            if !item.choices.iter().any(|c| c.id == item.answer) {
                warnings.push(SemanticWarning::AnswerNotAmongChoices {
                    index,
                    answer: item.answer,
                });
            }
        }

        for (index, item) in self.mini_test.ordering.iter().enumerate() {
            if !is_permutation(&item.answer_order, item.items.len()) {
                warnings.push(SemanticWarning::OrderNotPermutation { index });
            }
        }

        warnings
    }

    /// Iterate the four knowledge sections as `(section, label, details)`.
    pub fn knowledge_sections(&self) -> impl Iterator<Item = (&'static str, &str, &[String])> {
        let causes = self
            .causes
            .iter()
            .map(|c| ("causes", c.title.as_str(), c.details.as_slice()));
        let developments = self
            .developments
            .iter()
            .map(|d| ("developments", d.step.as_str(), d.details.as_slice()));
        let results = self
            .results
            .iter()
            .map(|r| ("results", r.title.as_str(), r.details.as_slice()));
        let significance = self
            .significance
            .iter()
            .map(|s| ("significance", s.title.as_str(), s.details.as_slice()));

        causes.chain(developments).chain(results).chain(significance)
    }
}

fn is_permutation(order: &[i64], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in order {
        match usize::try_from(i).ok().filter(|&i| i < len) {
            Some(i) if !seen[i] => seen[i] = true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz_document(mcq: Vec<McqItem>, ordering: Vec<OrderingItem>) -> HistoryDocument {
        HistoryDocument {
            event_name: "Cách mạng tháng Tám".to_string(),
            timeline: Timeline {
                start: Some("08/1945".to_string()),
                end: None,
                key_dates: vec![],
            },
            causes: vec![],
            developments: vec![],
            results: vec![],
            significance: vec![],
            related_events: vec![],
            why_questions: vec![],
            mini_test: MiniTest {
                mcq,
                ordering,
                short_answer: vec![],
            },
        }
    }

    fn mcq(answer: ChoiceId, ids: &[ChoiceId]) -> McqItem {
        McqItem {
            q: "Q".to_string(),
            choices: ids
                .iter()
                .map(|&id| Choice {
                    id,
                    text: id.to_string(),
                })
                .collect(),
            answer,
            explain: String::new(),
        }
    }

    fn ordering(order: Vec<i64>, n: usize) -> OrderingItem {
        OrderingItem {
            q: "Order".to_string(),
            items: (0..n).map(|i| format!("item {}", i)).collect(),
            answer_order: order,
            explain: String::new(),
        }
    }

    #[test]
    fn test_consistent_quiz_has_no_warnings() {
        let doc = quiz_document(
            vec![mcq(ChoiceId::B, &ChoiceId::ALL)],
            vec![ordering(vec![2, 0, 1], 3)],
        );
        assert!(doc.semantic_warnings().is_empty());
    }

    #[test]
    fn test_answer_missing_from_choices_is_reported() {
        let doc = quiz_document(vec![mcq(ChoiceId::D, &[ChoiceId::A, ChoiceId::B])], vec![]);
        assert_eq!(
            doc.semantic_warnings(),
            vec![SemanticWarning::AnswerNotAmongChoices {
                index: 0,
                answer: ChoiceId::D
            }]
        );
    }

    #[test]
    fn test_non_permutation_orders_are_reported() {
        let doc = quiz_document(
            vec![],
            vec![
                ordering(vec![0, 0, 1, 2], 4),
                ordering(vec![0, 1], 3),
                ordering(vec![0, -1], 2),
                ordering(vec![1, 0], 2),
            ],
        );
        let warnings = doc.semantic_warnings();
        assert_eq!(
            warnings,
            vec![
                SemanticWarning::OrderNotPermutation { index: 0 },
                SemanticWarning::OrderNotPermutation { index: 1 },
                SemanticWarning::OrderNotPermutation { index: 2 },
            ]
        );
        assert!(warnings[0].to_string().contains("mini_test.ordering[0]"));
    }

    #[test]
    fn test_knowledge_sections_walk_in_document_order() {
        let item = |title: &str| KnowledgeItem {
            title: title.to_string(),
            details: vec![format!("{} chi tiết", title)],
        };
        let mut doc = quiz_document(vec![], vec![]);
        doc.significance = vec![item("Kỷ nguyên mới")];
        doc.causes = vec![item("Nhật đầu hàng"), item("Việt Minh")];
        doc.developments = vec![DevelopmentStep {
            step: "Tổng khởi nghĩa".to_string(),
            details: vec![],
        }];

        let sections: Vec<_> = doc
            .knowledge_sections()
            .map(|(section, label, details)| (section, label, details.len()))
            .collect();
        assert_eq!(
            sections,
            vec![
                ("causes", "Nhật đầu hàng", 1),
                ("causes", "Việt Minh", 1),
                ("developments", "Tổng khởi nghĩa", 0),
                ("significance", "Kỷ nguyên mới", 1),
            ]
        );
    }

    #[test]
    fn test_choice_id_serializes_as_letter() {
        let json = serde_json::to_string(&ChoiceId::C).unwrap();
        assert_eq!(json, "\"C\"");
    }
}
