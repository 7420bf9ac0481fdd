//! The shared database handle.

use lexlib_types::{ColumnKind, Dialect};
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;

use crate::error::DbError;
use crate::executor::Row;
use crate::migrations::{run_migrations, MigrationError, MigrationReport};
use crate::pool::{create_pool, DbPool, DbRuntimeSettings};
use crate::stats::{size, SizeStats};
use crate::template::Query;
use crate::tx::run_in_transaction;
use crate::value::Arg;

/// A pooled database of a known dialect.
///
/// Statements run through [`Database::exec`] and friends take a connection
/// from the pool for the duration of the call. Cloning is cheap; clones share
/// the pool.
#[derive(Clone)]
pub struct Database {
    dialect: Dialect,
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect)
            .field("pool_max_size", &self.pool.max_size())
            .finish()
    }
}

impl Database {
    /// Opens `url` as a `dialect` database.
    ///
    /// # Errors
    ///
    /// Returns `DbError::UnsupportedDriver` when no driver is linked for
    /// `dialect`, or `DbError::PoolInit` if the pool cannot be built.
    pub fn open(dialect: Dialect, url: &str, settings: DbRuntimeSettings) -> Result<Self, DbError> {
        match dialect {
            Dialect::Sqlite => Ok(Self::from_pool(create_pool(url, settings)?)),
            Dialect::Postgres
            | Dialect::Mysql
            | Dialect::Mariadb
            | Dialect::Sqlserver
            | Dialect::Cockroachdb => Err(DbError::UnsupportedDriver(dialect)),
        }
    }

    /// Wraps an existing SQLite pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            pool,
        }
    }

    /// The dialect every statement is rendered for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Takes a connection from the pool.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Pool` if none becomes available in time.
    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, DbError> {
        Ok(self.pool.get()?)
    }

    /// Executes `query`; returns rows affected.
    pub fn exec(&self, query: &Query, args: &[Arg]) -> Result<usize, DbError> {
        let conn = self.conn()?;
        query.bind(&*conn).exec(args)
    }

    /// Runs `query` and decodes every row as `columns`.
    pub fn query(&self, query: &Query, args: &[Arg], columns: &[ColumnKind]) -> Result<Vec<Row>, DbError> {
        let conn = self.conn()?;
        query.bind(&*conn).query(args, columns)
    }

    /// Runs `query` and returns its first row, if any.
    pub fn query_row(
        &self,
        query: &Query,
        args: &[Arg],
        columns: &[ColumnKind],
    ) -> Result<Option<Row>, DbError> {
        let conn = self.conn()?;
        query.bind(&*conn).query_row(args, columns)
    }

    /// Runs `work` in a transaction on a pooled connection.
    ///
    /// # Errors
    ///
    /// See [`run_in_transaction`].
    pub fn begin_tx<T, F>(&self, work: F) -> Result<T, DbError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DbError>,
    {
        let mut conn = self.conn()?;
        run_in_transaction(&mut conn, work)
    }

    /// Storage used by the database; see [`SizeStats`].
    pub fn size(&self) -> Result<SizeStats, DbError> {
        let conn = self.conn()?;
        size(&*conn)
    }

    /// Brings the schema to this build's version.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if any step fails; see
    /// [`run_migrations`].
    pub fn ensure_schema(&self, allow_rollback: bool) -> Result<MigrationReport, MigrationError> {
        let conn = self.conn().map_err(MigrationError::Ledger)?;
        run_migrations(&*conn, allow_rollback)
    }
}
