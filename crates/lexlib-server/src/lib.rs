//! Lex Library startup: configuration, logging and schema reconciliation.
//!
//! The data layer is ready only once the schema matches this build. Any
//! compile or migration error aborts startup; there is no partial-service
//! mode.

pub mod config;

use config::{Config, LoggingConfig};
use lexlib_db::{Database, DbError, MigrationError, MigrationReport};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The database could not be opened.
    #[error("failed to open database: {0}")]
    Open(#[from] DbError),

    /// The schema could not be brought to this build's version.
    #[error("schema migration failed: {0}")]
    Migration(#[from] MigrationError),
}

/// Installs the global `tracing` subscriber.
///
/// Falls back to `info` when `logging.level` is not a valid filter. Returns
/// `false` if a subscriber was already installed; that one stays in place.
pub fn init_tracing(logging: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    match installed {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "tracing subscriber already installed, keeping it");
            false
        }
    }
}

/// Opens the configured database and reconciles its schema.
///
/// # Errors
///
/// Returns `StartupError` if the database cannot be opened or any migration
/// step fails.
pub fn startup(config: &Config) -> Result<(Database, MigrationReport), StartupError> {
    let db = Database::open(
        config.database.kind,
        &config.database.url,
        config.database.runtime_settings(),
    )?;

    let report = db.ensure_schema(config.database.allow_schema_rollback)?;

    tracing::info!(
        dialect = %db.dialect(),
        from = ?report.from,
        to = report.to,
        applied = report.applied,
        rolled_back = report.rolled_back,
        "database schema ready"
    );

    Ok((db, report))
}
