//! Typed access paths into parsed JSON documents
//!
//! A [`JsonPath`] is a fixed sequence of object keys and array indices. Resolving
//! it either yields the value at the end of the path or a [`PathError`] naming
//! the exact step that failed.

use std::fmt;

use serde_json::Value;

/// One navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Key(&'static str),
    Index(usize),
}

/// A static path such as `activities-steps[0].value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonPath(&'static [Step]);

/// Why a path could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathErrorKind {
    MissingKey,
    IndexOutOfRange { len: usize },
    NotAnObject { found: &'static str },
    NotAnArray { found: &'static str },
}

/// Resolution failure, with the path up to and including the failing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathError {
    pub path: String,
    pub kind: PathErrorKind,
}

impl PathError {
    /// Qualify the failing path with the location it was resolved from
    pub fn within(mut self, base: &str) -> Self {
        if !base.is_empty() {
            self.path = join_display(base, &self.path);
        }
        self
    }

    /// Missing keys and short arrays, as opposed to shape mismatches
    pub fn is_missing(&self) -> bool {
        matches!(
            self.kind,
            PathErrorKind::MissingKey | PathErrorKind::IndexOutOfRange { .. }
        )
    }
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PathErrorKind::MissingKey => write!(f, "missing key {}", self.path),
            PathErrorKind::IndexOutOfRange { len } => {
                write!(f, "{} out of range (array has {} entries)", self.path, len)
            }
            PathErrorKind::NotAnObject { found } => {
                write!(f, "{}: expected object, found {}", self.path, found)
            }
            PathErrorKind::NotAnArray { found } => {
                write!(f, "{}: expected array, found {}", self.path, found)
            }
        }
    }
}

impl std::error::Error for PathError {}

impl JsonPath {
    pub const fn new(steps: &'static [Step]) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &'static [Step] {
        self.0
    }

    /// Walk the path from `root`
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, PathError> {
        let mut current = root;

        for (i, step) in self.0.iter().enumerate() {
            let fail = |kind| PathError {
                path: render(&self.0[..=i]),
                kind,
            };

            current = match *step {
                Step::Key(key) => match current {
                    Value::Object(map) => map.get(key).ok_or_else(|| fail(PathErrorKind::MissingKey))?,
                    other => {
                        return Err(fail(PathErrorKind::NotAnObject {
                            found: type_name(other),
                        }))
                    }
                },
                Step::Index(index) => match current {
                    Value::Array(items) => items.get(index).ok_or_else(|| {
                        fail(PathErrorKind::IndexOutOfRange { len: items.len() })
                    })?,
                    other => {
                        return Err(fail(PathErrorKind::NotAnArray {
                            found: type_name(other),
                        }))
                    }
                },
            };
        }

        Ok(current)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.0))
    }
}

/// JSON type name for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn render(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            Step::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Step::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}

fn join_display(base: &str, rest: &str) -> String {
    if rest.starts_with('[') {
        format!("{}{}", base, rest)
    } else {
        format!("{}.{}", base, rest)
    }
}
