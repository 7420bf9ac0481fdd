//! Error types for statement execution and transactions.

use lexlib_types::{ColumnKind, Dialect};

use crate::pool::PoolError;
use crate::template::{RenderError, TemplateError};

/// Errors that can occur while executing statements.
///
/// Driver errors pass through unchanged; translating them into domain
/// errors (a unique-constraint violation into a conflict, say) is the
/// caller's business.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The SQLite driver reported an error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A pooled connection could not be acquired.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The connection pool could not be created.
    #[error(transparent)]
    PoolInit(#[from] PoolError),

    /// A built-in query template failed to compile.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The statement could not be rendered from its template.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A stored value does not fit the requested column kind.
    #[error("cannot decode stored {found} value as {kind:?}")]
    Decode {
        /// Requested column kind.
        kind: ColumnKind,
        /// Storage class actually found.
        found: String,
    },

    /// `BEGIN` failed.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] rusqlite::Error),

    /// `COMMIT` failed.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] rusqlite::Error),

    /// Rolling back after a failed unit of work also failed. The connection
    /// is in an unknown state.
    #[error("transaction rollback failed ({source}) after error: {original}")]
    Rollback {
        /// The error that triggered the rollback.
        original: Box<DbError>,
        /// The rollback failure.
        #[source]
        source: rusqlite::Error,
    },

    /// No driver is linked for the configured dialect.
    #[error("no driver is linked for {0} databases")]
    UnsupportedDriver(Dialect),

    /// A caller-supplied unit of work failed for a non-database reason.
    #[error(transparent)]
    Work(Box<dyn std::error::Error + Send + Sync>),
}

impl DbError {
    /// Wraps an arbitrary error raised inside a unit of work.
    pub fn work<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Work(Box::new(err))
    }
}
