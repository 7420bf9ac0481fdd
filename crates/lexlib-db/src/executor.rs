//! Statement execution.
//!
//! [`Executor`] is the seam between rendered statements and a driver. The
//! SQLite implementation lives here; other backends implement the same trait
//! and get query binding, transactions around migration steps and the
//! migration runner for free.

use lexlib_types::{ColumnKind, Dialect};
use rusqlite::Connection;

use crate::error::DbError;
use crate::template::{Params, Query, Statement};
use crate::value::{Arg, Value};

/// One decoded result row, in select-list order.
pub type Row = Vec<Value>;

/// A unit inside [`Executor::execute_atomic`].
#[derive(Debug, Clone, Copy)]
pub enum Command<'a> {
    /// Parameterless SQL, possibly several statements.
    Script(&'a str),
    /// A single rendered statement.
    Statement(&'a Statement),
}

/// Runs rendered statements against one connection.
pub trait Executor {
    /// The dialect statements must be rendered for.
    fn dialect(&self) -> Dialect;

    /// Executes a statement that returns no rows; returns rows affected.
    fn execute(&self, statement: &Statement) -> Result<usize, DbError>;

    /// Runs a query, decoding each row's columns as `columns`.
    fn query(&self, statement: &Statement, columns: &[ColumnKind]) -> Result<Vec<Row>, DbError>;

    /// Executes parameterless SQL text verbatim.
    fn execute_script(&self, script: &str) -> Result<(), DbError>;

    /// Executes `commands` in order, as one transaction when the dialect
    /// supports transactional DDL. MySQL and MariaDB commit implicitly
    /// around DDL, so there the commands run one after another.
    ///
    /// The default spells the transaction as SQL through
    /// [`Executor::execute_script`]; drivers with a native transaction API
    /// should override it.
    fn execute_atomic(&self, commands: &[Command<'_>]) -> Result<(), DbError> {
        let dialect = self.dialect();
        if !dialect.supports_transactional_ddl() {
            return run_commands(self, commands);
        }

        let verbs = TransactionVerbs::for_dialect(dialect);
        self.execute_script(verbs.begin)?;
        match run_commands(self, commands) {
            Ok(()) => self.execute_script(verbs.commit),
            Err(err) => {
                if let Err(rollback) = self.execute_script(verbs.rollback) {
                    tracing::error!(
                        error = %err,
                        rollback_error = %rollback,
                        "rollback failed after atomic command error"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Transaction control statements for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransactionVerbs {
    begin: &'static str,
    commit: &'static str,
    rollback: &'static str,
}

impl TransactionVerbs {
    fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Sqlserver => Self {
                begin: "BEGIN TRANSACTION",
                commit: "COMMIT TRANSACTION",
                rollback: "ROLLBACK TRANSACTION",
            },
            Dialect::Sqlite
            | Dialect::Postgres
            | Dialect::Cockroachdb
            | Dialect::Mysql
            | Dialect::Mariadb => Self {
                begin: "BEGIN",
                commit: "COMMIT",
                rollback: "ROLLBACK",
            },
        }
    }
}

fn run_commands<E: Executor + ?Sized>(executor: &E, commands: &[Command<'_>]) -> Result<(), DbError> {
    for command in commands {
        match command {
            Command::Script(script) => executor.execute_script(script)?,
            Command::Statement(statement) => {
                executor.execute(statement)?;
            }
        }
    }
    Ok(())
}

impl Executor for Connection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, statement: &Statement) -> Result<usize, DbError> {
        let mut stmt = self.prepare_cached(&statement.sql)?;
        bind_params(&mut stmt, &statement.params)?;
        Ok(stmt.raw_execute()?)
    }

    fn query(&self, statement: &Statement, columns: &[ColumnKind]) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.prepare_cached(&statement.sql)?;
        bind_params(&mut stmt, &statement.params)?;

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = columns
                .iter()
                .enumerate()
                .map(|(i, kind)| Value::from_sqlite(*kind, row.get_ref(i)?))
                .collect::<Result<Row, DbError>>()?;
            out.push(values);
        }
        Ok(out)
    }

    fn execute_script(&self, script: &str) -> Result<(), DbError> {
        Ok(self.execute_batch(script)?)
    }

    fn execute_atomic(&self, commands: &[Command<'_>]) -> Result<(), DbError> {
        let tx = self.unchecked_transaction().map_err(DbError::Begin)?;
        for command in commands {
            match command {
                Command::Script(script) => tx.execute_batch(script)?,
                Command::Statement(statement) => {
                    Executor::execute(&*tx, statement)?;
                }
            }
        }
        // Dropping `tx` on an early return rolls everything back.
        tx.commit().map_err(DbError::Commit)
    }
}

fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &Params) -> Result<(), DbError> {
    match params {
        Params::Positional(values) => {
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
        }
        Params::Named(values) => {
            for (name, value) in values {
                let placeholder = format!("@{name}");
                let index = stmt
                    .parameter_index(&placeholder)?
                    .ok_or(rusqlite::Error::InvalidParameterName(placeholder))?;
                stmt.raw_bind_parameter(index, value)?;
            }
        }
    }
    Ok(())
}

/// A query routed through a specific executor.
///
/// Produced by [`Query::bind`] and [`Query::bind_transaction`]; the query it
/// came from is not changed.
pub struct BoundQuery<'e, E: ?Sized> {
    query: Query,
    executor: &'e E,
}

impl<'e, E: Executor + ?Sized> BoundQuery<'e, E> {
    pub(crate) fn new(query: Query, executor: &'e E) -> Self {
        Self { query, executor }
    }

    /// Renders for the executor's dialect without running anything.
    pub fn render(&self, args: &[Arg]) -> Result<Statement, DbError> {
        Ok(self.query.render(self.executor.dialect(), args)?)
    }

    /// Executes the statement; returns rows affected.
    pub fn exec(&self, args: &[Arg]) -> Result<usize, DbError> {
        let statement = self.prepare(args)?;
        self.executor.execute(&statement)
    }

    /// Runs the query and decodes every row.
    pub fn query(&self, args: &[Arg], columns: &[ColumnKind]) -> Result<Vec<Row>, DbError> {
        let statement = self.prepare(args)?;
        self.executor.query(&statement, columns)
    }

    /// Runs the query and returns its first row, if any.
    pub fn query_row(&self, args: &[Arg], columns: &[ColumnKind]) -> Result<Option<Row>, DbError> {
        Ok(self.query(args, columns)?.into_iter().next())
    }

    fn prepare(&self, args: &[Arg]) -> Result<Statement, DbError> {
        let statement = self.render(args)?;
        tracing::debug!(
            label = self.query.context().label.as_deref().unwrap_or("-"),
            sql = %statement.sql,
            params = statement.params.len(),
            "executing statement"
        );
        Ok(statement)
    }
}
