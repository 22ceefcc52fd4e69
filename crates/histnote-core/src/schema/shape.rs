//! Schema-as-data and the walker that checks JSON values against it.

use serde_json::Value;
use std::fmt;

/// Expected shape of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    String,
    /// Whole number that fits in an `i64`.
    Integer,
    /// The inner shape, or `null`.
    Nullable(Box<Shape>),
    /// A string from a fixed set.
    Enum(&'static [&'static str]),
    Array(Box<Shape>),
    Record(Vec<Field>),
}

/// A named member of a [`Shape::Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
}

impl Field {
    pub fn required(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: true,
        }
    }

    pub fn optional(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: false,
        }
    }
}

/// Why a value failed its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A required field is absent.
    Missing,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    NotInEnum {
        allowed: &'static [&'static str],
        found: String,
    },
    /// The value passed the walk but could not be converted to its Rust type.
    Rejected(String),
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Missing => write!(f, "missing required field"),
            ViolationKind::WrongType { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            ViolationKind::NotInEnum { allowed, found } => {
                write!(f, "'{}' is not one of {}", found, allowed.join("|"))
            }
            ViolationKind::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// One failed check, located by a dotted path such as `mini_test.mcq[0].answer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Empty for the root value.
    pub path: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<root>"
        } else {
            &self.path
        };
        write!(f, "{}: {}", path, self.kind)
    }
}

impl Shape {
    /// Shorthand for `Shape::Array(Box::new(item))`.
    pub fn array_of(item: Shape) -> Self {
        Shape::Array(Box::new(item))
    }

    pub fn nullable(inner: Shape) -> Self {
        Shape::Nullable(Box::new(inner))
    }

    /// Name used in type-mismatch reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::String | Shape::Enum(_) => "string",
            Shape::Integer => "integer",
            Shape::Nullable(inner) => inner.type_name(),
            Shape::Array(_) => "array",
            Shape::Record(_) => "object",
        }
    }

    /// Check `value` and append every violation found below `path`.
    ///
    /// The walk never stops early: every field of every record is visited so
    /// the caller sees the full list.
    pub fn check(&self, value: &Value, path: &str, violations: &mut Vec<Violation>) {
        match self {
            Shape::String => {
                if !value.is_string() {
                    violations.push(self.wrong_type(value, path));
                }
            }
            Shape::Integer => {
                if value.as_i64().is_none() {
                    violations.push(self.wrong_type(value, path));
                }
            }
            Shape::Nullable(inner) => {
                if !value.is_null() {
                    inner.check(value, path, violations);
                }
            }
            Shape::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                Some(s) => violations.push(Violation {
                    path: path.to_string(),
                    kind: ViolationKind::NotInEnum {
                        allowed: *allowed,
                        found: s.to_string(),
                    },
                }),
                None => violations.push(self.wrong_type(value, path)),
            },
            Shape::Array(item) => match value.as_array() {
                Some(elements) => {
                    for (index, element) in elements.iter().enumerate() {
                        item.check(element, &format!("{}[{}]", path, index), violations);
                    }
                }
                None => violations.push(self.wrong_type(value, path)),
            },
            Shape::Record(fields) => match value.as_object() {
                Some(object) => {
                    for field in fields {
                        let field_path = join_path(path, field.name);
                        match object.get(field.name) {
                            Some(member) => field.shape.check(member, &field_path, violations),
                            None if field.required => violations.push(Violation {
                                path: field_path,
                                kind: ViolationKind::Missing,
                            }),
                            None => {}
                        }
                    }
                }
                None => violations.push(self.wrong_type(value, path)),
            },
        }
    }

    /// Collect all violations of `value` against this shape.
    pub fn violations(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check(value, "", &mut violations);
        violations
    }

    fn wrong_type(&self, value: &Value, path: &str) -> Violation {
        Violation {
            path: path.to_string(),
            kind: ViolationKind::WrongType {
                expected: self.type_name(),
                found: json_type(value),
            },
        }
    }
}

fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
