//! The history knowledge frame expressed as a [`Shape`].

use lazy_static::lazy_static;

use super::shape::{Field, Shape};
use crate::document::ChoiceId;

lazy_static! {
    /// Full `HistoryDocument` shape.
    pub static ref HISTORY_SCHEMA: Shape = history_shape();

    /// `why_questions` array on its own.
    pub static ref WHY_QUESTIONS_SCHEMA: Shape = why_questions_shape();

    /// `mini_test` object on its own.
    pub static ref MINI_TEST_SCHEMA: Shape = mini_test_shape();
}

fn string_list() -> Shape {
    Shape::array_of(Shape::String)
}

fn record_list(fields: Vec<Field>) -> Shape {
    Shape::array_of(Shape::Record(fields))
}

/// Causes, developments, results and significance share this shape; only the
/// label field differs (`title` or `step`).
fn knowledge_section(label: &'static str) -> Shape {
    record_list(vec![
        Field::required(label, Shape::String),
        Field::required("details", string_list()),
    ])
}

fn choice_id() -> Shape {
    Shape::Enum(ChoiceId::WIRE_VALUES)
}

fn timeline_shape() -> Shape {
    Shape::Record(vec![
        Field::required("start", Shape::nullable(Shape::String)),
        Field::required("end", Shape::nullable(Shape::String)),
        Field::required(
            "key_dates",
            record_list(vec![
                Field::required("date", Shape::String),
                Field::required("note", Shape::String),
            ]),
        ),
    ])
}

fn why_questions_shape() -> Shape {
    record_list(vec![
        Field::required("q", Shape::String),
        Field::required("expected_points", string_list()),
    ])
}

fn mini_test_shape() -> Shape {
    let mcq = record_list(vec![
        Field::required("q", Shape::String),
        Field::required(
            "choices",
            record_list(vec![
                Field::required("id", choice_id()),
                Field::required("text", Shape::String),
            ]),
        ),
        Field::required("answer", choice_id()),
        Field::required("explain", Shape::String),
    ]);

    let ordering = record_list(vec![
        Field::required("q", Shape::String),
        Field::required("items", string_list()),
        Field::required("answer_order", Shape::array_of(Shape::Integer)),
        Field::required("explain", Shape::String),
    ]);

    let short_answer = record_list(vec![
        Field::required("q", Shape::String),
        Field::required("rubric", string_list()),
    ]);

    Shape::Record(vec![
        Field::required("mcq", mcq),
        Field::required("ordering", ordering),
        Field::required("short_answer", short_answer),
    ])
}

fn history_shape() -> Shape {
    Shape::Record(vec![
        Field::required("event_name", Shape::String),
        Field::required("timeline", timeline_shape()),
        Field::required("causes", knowledge_section("title")),
        Field::required("developments", knowledge_section("step")),
        Field::required("results", knowledge_section("title")),
        Field::required("significance", knowledge_section("title")),
        Field::required(
            "related_events",
            record_list(vec![
                Field::required("name", Shape::String),
                Field::required("relation", Shape::String),
            ]),
        ),
        Field::required("why_questions", why_questions_shape()),
        Field::required("mini_test", mini_test_shape()),
    ])
}
