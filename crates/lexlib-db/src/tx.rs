//! Transaction coordinator.

use rusqlite::{Connection, Transaction};

use crate::error::DbError;

/// Runs `work` inside a transaction on `conn`.
///
/// Commits when `work` succeeds. When it fails the transaction is rolled back
/// and the error from `work` is returned unchanged; if the rollback itself
/// fails, both errors come back together as [`DbError::Rollback`].
///
/// Transactions do not nest and nothing is retried.
///
/// # Errors
///
/// Returns `DbError::Begin` or `DbError::Commit` when those steps fail, the
/// error from `work`, or `DbError::Rollback`.
pub fn run_in_transaction<T, F>(conn: &mut Connection, work: F) -> Result<T, DbError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, DbError>,
{
    let tx = conn.transaction().map_err(DbError::Begin)?;

    match work(&tx) {
        Ok(value) => {
            tx.commit().map_err(DbError::Commit)?;
            Ok(value)
        }
        Err(original) => match tx.rollback() {
            Ok(()) => Err(original),
            Err(source) => {
                tracing::error!(
                    error = %source,
                    original = %original,
                    "transaction rollback failed"
                );
                Err(DbError::Rollback {
                    original: Box::new(original),
                    source,
                })
            }
        },
    }
}
