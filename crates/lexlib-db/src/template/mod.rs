//! Dialect-neutral query templates.
//!
//! A [`Query`] is compiled once, usually when the module that owns it is
//! first used, and rendered many times. Compilation parses the template and
//! resolves one plan per dialect up front, so every compile-time check
//! (unknown directives, duplicate arguments, unmapped column types) fires
//! before any statement runs.
//!
//! ```text
//! insert into t (id, created) values ({{arg "id"}}, {{NOW}})
//! select * from t where id in ({{args "ids"}}) and active = {{TRUE}}
//! create table t (name {{varchar "group.name"}} NOT NULL, data {{bytes}})
//! {{if sqlite}}...{{else if or postgres cockroachdb}}...{{else}}...{{end}}
//! ```

mod parse;
mod plan;
mod render;


use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexlib_types::Dialect;
use rusqlite::{Connection, Transaction};
use thiserror::Error;

use crate::executor::{BoundQuery, Executor};
use crate::value::{canonical_timestamp, Arg};
use plan::Plan;

pub use render::{Params, RenderError, Statement};

/// Errors detected while compiling a template.
///
/// Templates are static program text, so these are programmer errors: the
/// process should refuse to start rather than recover.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `{{` without a matching `}}`.
    #[error("unclosed action starting at byte {at}")]
    UnclosedAction {
        /// Byte offset of the `{{`.
        at: usize,
    },

    /// The action names no known directive.
    #[error("unknown directive '{name}' at byte {at}")]
    UnknownDirective {
        /// The directive word.
        name: String,
        /// Byte offset of the action.
        at: usize,
    },

    /// The action is syntactically wrong.
    #[error("malformed action at byte {at}: {reason}")]
    Malformed {
        /// Byte offset of the action.
        at: usize,
        /// What is wrong.
        reason: String,
    },

    /// An argument name is not an identifier.
    #[error("invalid argument name '{name}' at byte {at}")]
    InvalidArgumentName {
        /// The rejected name.
        name: String,
        /// Byte offset of the action.
        at: usize,
    },

    /// An argument is declared more than once on one dialect's path.
    #[error("argument '{name}' is declared more than once when rendered for {dialect}")]
    DuplicateArgument {
        /// The repeated name.
        name: String,
        /// The dialect whose path repeats it.
        dialect: Dialect,
    },

    /// `varchar` names a field with no registered limit.
    #[error("no field limit registered for '{field}' (byte {at})")]
    UnknownField {
        /// The field name.
        field: String,
        /// Byte offset of the action.
        at: usize,
    },

    /// `else` or `end` outside an `if` block.
    #[error("'{directive}' at byte {at} has no matching if")]
    UnexpectedBranch {
        /// `else` or `end`.
        directive: &'static str,
        /// Byte offset of the action.
        at: usize,
    },

    /// `if` without a closing `end`.
    #[error("if at byte {at} is missing its end")]
    UnclosedIf {
        /// Byte offset of the `if`.
        at: usize,
    },
}

/// Call-scoped data carried by a query derivative.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    /// Name reported with every executed statement in logs.
    pub label: Option<Cow<'static, str>>,
    /// Pinned instant for `NOW`; the wall clock is used when unset.
    pub now: Option<DateTime<Utc>>,
}

impl QueryContext {
    /// A context that only carries a log label.
    pub fn labeled(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: Some(label.into()),
            now: None,
        }
    }

    /// Pins `NOW` to `at` (canonicalized).
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.now = Some(canonical_timestamp(&at));
        self
    }
}

#[derive(Debug)]
struct Compiled {
    source: String,
    arg_names: Vec<String>,
    plans: Vec<Plan>,
}

/// A compiled, immutable query template.
///
/// Cloning is cheap and clones share the compiled form. Derivatives made by
/// [`Query::with_context`], [`Query::bind`] and [`Query::bind_transaction`]
/// never modify the query they were made from, so a single `Query` can be
/// shared freely across threads.
#[derive(Debug, Clone)]
pub struct Query {
    compiled: Arc<Compiled>,
    context: QueryContext,
}

impl Query {
    /// Compiles a template.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the template is malformed or if any
    /// dialect's path declares an argument twice.
    pub fn compile(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let nodes = parse::parse(&source)?;
        let plans = Dialect::ALL
            .into_iter()
            .map(|dialect| Plan::build(&nodes, dialect))
            .collect::<Result<Vec<_>, _>>()?;
        let arg_names = plan::argument_names(&nodes);

        Ok(Self {
            compiled: Arc::new(Compiled {
                source,
                arg_names,
                plans,
            }),
            context: QueryContext::default(),
        })
    }

    /// The template text this query was compiled from.
    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    /// Distinct argument names referenced anywhere in the template, in
    /// first-occurrence order.
    pub fn arg_names(&self) -> &[String] {
        &self.compiled.arg_names
    }

    /// The call-scoped data attached to this derivative.
    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Returns a copy carrying `context`; `self` is unchanged.
    #[must_use]
    pub fn with_context(&self, context: QueryContext) -> Self {
        Self {
            compiled: Arc::clone(&self.compiled),
            context,
        }
    }

    /// Renders for `dialect`, taking `NOW` from the context or the clock.
    ///
    /// # Errors
    ///
    /// Returns `RenderError` if an argument on the rendered path is missing
    /// or has the wrong shape, or a list argument is empty.
    pub fn render(&self, dialect: Dialect, args: &[Arg]) -> Result<Statement, RenderError> {
        let now = self.context.now.unwrap_or_else(Utc::now);
        self.render_at(dialect, args, now)
    }

    /// Renders for `dialect` with `NOW` fixed at `now`.
    ///
    /// Output is a pure function of the template, dialect, arguments and
    /// `now`.
    ///
    /// # Errors
    ///
    /// See [`Query::render`].
    pub fn render_at(
        &self,
        dialect: Dialect,
        args: &[Arg],
        now: DateTime<Utc>,
    ) -> Result<Statement, RenderError> {
        let plan = &self.compiled.plans[dialect.index()];
        render::render(plan, dialect, args, &canonical_timestamp(&now))
    }

    /// Routes this query through `executor`.
    pub fn bind<'e, E: Executor + ?Sized>(&self, executor: &'e E) -> BoundQuery<'e, E> {
        BoundQuery::new(self.clone(), executor)
    }

    /// Routes this query through an open transaction.
    pub fn bind_transaction<'t>(&self, tx: &'t Transaction<'_>) -> BoundQuery<'t, Connection> {
        let conn: &'t Connection = tx;
        self.bind(conn)
    }
}
