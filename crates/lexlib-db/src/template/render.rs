//! Statement rendering and argument binding.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use lexlib_types::{Dialect, PlaceholderStyle};
use thiserror::Error;

use super::plan::{Plan, Segment};
use crate::typemap::timestamp_literal;
use crate::value::{Arg, ArgValue, Value};

/// Errors raised while binding arguments to a compiled template.
///
/// These are programming errors at the call site; tests are expected to
/// catch them, nothing retries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The rendered path references an argument that was not supplied.
    #[error("missing argument '{name}'")]
    MissingArgument {
        /// Argument name.
        name: String,
    },

    /// A list-expansion argument was bound to an empty collection.
    #[error("list argument '{name}' is empty")]
    EmptyList {
        /// Argument name.
        name: String,
    },

    /// A collection was supplied for a scalar marker.
    #[error("argument '{name}' is a list but the template expects a single value")]
    ExpectedScalar {
        /// Argument name.
        name: String,
    },

    /// A single value was supplied for a list-expansion marker.
    #[error("argument '{name}' is a single value but the template expects a list")]
    ExpectedList {
        /// Argument name.
        name: String,
    },
}

/// Bound parameters, in the shape the dialect's driver expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Values in placeholder order.
    Positional(Vec<Value>),
    /// Values tagged with their placeholder name (without the `@`).
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Number of bound values.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound values in placeholder order, without names.
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Self::Positional(values) => values.iter().collect(),
            Self::Named(values) => values.iter().map(|(_, v)| v).collect(),
        }
    }
}

/// Final statement text plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Parameters for the placeholders in `sql`.
    pub params: Params,
}

impl Statement {
    /// A statement with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Positional(Vec::new()),
        }
    }
}

pub(crate) fn render(
    plan: &Plan,
    dialect: Dialect,
    args: &[Arg],
    now: &DateTime<Utc>,
) -> Result<Statement, RenderError> {
    let mut binder = Binder::new(dialect.placeholder_style());

    for segment in &plan.segments {
        match segment {
            Segment::Sql(text) => binder.sql.push_str(text),
            Segment::Now => binder.sql.push_str(&timestamp_literal(now, dialect)),
            Segment::Scalar(name) => match lookup(args, name)? {
                ArgValue::Scalar(value) => binder.bind(name, None, value.clone()),
                ArgValue::List(_) => {
                    return Err(RenderError::ExpectedScalar { name: name.clone() })
                }
            },
            Segment::List(name) => match lookup(args, name)? {
                ArgValue::List(values) if values.is_empty() => {
                    return Err(RenderError::EmptyList { name: name.clone() })
                }
                ArgValue::List(values) => {
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            binder.sql.push(',');
                        }
                        binder.bind(name, Some(i), value.clone());
                    }
                }
                ArgValue::Scalar(_) => {
                    return Err(RenderError::ExpectedList { name: name.clone() })
                }
            },
        }
    }

    Ok(binder.finish())
}

/// First supplied argument with this name.
fn lookup<'a>(args: &'a [Arg], name: &str) -> Result<&'a ArgValue, RenderError> {
    args.iter()
        .find(|arg| arg.name() == name)
        .map(Arg::value)
        .ok_or_else(|| RenderError::MissingArgument {
            name: name.to_string(),
        })
}

struct Binder {
    style: PlaceholderStyle,
    sql: String,
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Binder {
    fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            sql: String::new(),
            positional: Vec::new(),
            named: Vec::new(),
        }
    }

    fn bind(&mut self, name: &str, element: Option<usize>, value: Value) {
        match self.style {
            PlaceholderStyle::Question => {
                self.sql.push('?');
                self.positional.push(value);
            }
            PlaceholderStyle::Numbered => {
                self.positional.push(value);
                let _ = write!(self.sql, "${}", self.positional.len());
            }
            PlaceholderStyle::Named => {
                let tag = match element {
                    Some(i) => format!("{name}__{i}"),
                    None => name.to_string(),
                };
                self.sql.push('@');
                self.sql.push_str(&tag);
                self.named.push((tag, value));
            }
        }
    }

    fn finish(self) -> Statement {
        let params = match self.style {
            PlaceholderStyle::Question | PlaceholderStyle::Numbered => {
                Params::Positional(self.positional)
            }
            PlaceholderStyle::Named => Params::Named(self.named),
        };
        Statement {
            sql: self.sql,
            params,
        }
    }
}
