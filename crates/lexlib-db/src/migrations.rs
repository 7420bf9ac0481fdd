//! Schema ledger and migration runner.
//!
//! Schema versions are an append-only list of template pairs; a version's
//! number is its index. The `schema_versions` table records every applied
//! version together with its rendered rollback script, so a database can be
//! walked back even by a binary that no longer knows the newer versions.
//!
//! The runner moves one version at a time, never skipping and never
//! repeating, and stops at the first failure.

use std::cmp::Ordering;

use chrono::Utc;
use lexlib_types::ColumnKind;
use thiserror::Error;

use crate::error::DbError;
use crate::executor::{Command, Executor};
use crate::template::{Query, RenderError, TemplateError};
use crate::value::{arg, canonical_timestamp, Value};

/// A single schema version. Once released, never edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    /// Template that moves the schema to this version.
    pub apply: &'static str,
    /// Template that undoes `apply`.
    pub rollback: &'static str,
}

/// Version 0 of every schema: the ledger itself.
pub const LEDGER_VERSION: SchemaVersion = SchemaVersion {
    apply: "
        create table schema_versions (
            version {{int}} PRIMARY KEY NOT NULL,
            rollback_script {{text}} NOT NULL,
            applied {{datetime}} NOT NULL
        )
    ",
    rollback: "drop table schema_versions",
};

/// What a migration run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version found in the database, `None` if there was no ledger.
    pub from: Option<usize>,
    /// Version the database is at now.
    pub to: usize,
    /// Versions applied.
    pub applied: usize,
    /// Versions rolled back.
    pub rolled_back: usize,
}

/// Errors that stop a migration run. None of them are retried.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The version list is empty.
    #[error("no schema versions defined")]
    NoVersions,

    /// A version's template does not compile.
    #[error("schema version {version} does not compile: {source}")]
    Compile {
        /// Version number.
        version: usize,
        /// Compile failure.
        source: TemplateError,
    },

    /// A ledger query does not compile.
    #[error("ledger query does not compile: {0}")]
    LedgerTemplate(#[source] TemplateError),

    /// A version's template could not be rendered.
    #[error("schema version {version} could not be rendered: {source}")]
    Render {
        /// Version number.
        version: usize,
        /// Render failure.
        source: RenderError,
    },

    /// Applying a version failed.
    #[error("applying schema version {version} failed: {source}")]
    Apply {
        /// Version number.
        version: usize,
        /// Underlying failure.
        source: DbError,
    },

    /// Rolling back a version failed.
    #[error("rolling back schema version {version} failed: {source}")]
    Rollback {
        /// Version number.
        version: usize,
        /// Underlying failure.
        source: DbError,
    },

    /// Reading the ledger failed.
    #[error("failed to read schema ledger: {0}")]
    Ledger(#[source] DbError),

    /// The ledger table exists but holds no versions.
    #[error("schema_versions table exists but is empty")]
    EmptyLedger,

    /// The ledger holds a version number that cannot be an index.
    #[error("schema_versions holds invalid version {0}")]
    InvalidVersion(i64),

    /// The ledger has no rollback script for a version being rolled back.
    #[error("no rollback script recorded for schema version {version}")]
    MissingRollback {
        /// Version number.
        version: usize,
    },

    /// The database is newer than this binary and rollback is not allowed.
    #[error(
        "database schema version {database} is newer than this build's version {code}; \
         enable schema rollback to downgrade"
    )]
    CodeTooOld {
        /// Version recorded in the database.
        database: usize,
        /// Latest version this binary knows.
        code: usize,
    },
}

/// Runs the application's schema versions against `executor`.
///
/// # Errors
///
/// Returns `MigrationError` on the first failure; the database is left at
/// the last version that completed.
pub fn run_migrations<E>(executor: &E, allow_rollback: bool) -> Result<MigrationReport, MigrationError>
where
    E: Executor + ?Sized,
{
    run_migrations_from_list(executor, crate::schema::VERSIONS, allow_rollback)
}

enum State {
    CheckLedgerTable,
    ReadCurrentVersion { first: bool },
    ApplyNext(usize),
    RollbackCurrent(usize),
    Done(usize),
}

/// Runs `versions` against `executor`. The first entry must create the
/// ledger; see [`LEDGER_VERSION`].
///
/// # Errors
///
/// See [`run_migrations`].
pub fn run_migrations_from_list<E>(
    executor: &E,
    versions: &[SchemaVersion],
    allow_rollback: bool,
) -> Result<MigrationReport, MigrationError>
where
    E: Executor + ?Sized,
{
    let compiled = compile_versions(versions)?;
    let ledger = Ledger::compile()?;
    let code_version = compiled.len() - 1;
    let dialect = executor.dialect();

    let mut report = MigrationReport::default();
    let mut state = State::CheckLedgerTable;

    loop {
        state = match state {
            State::CheckLedgerTable => {
                if ledger.table_exists(executor)? {
                    State::ReadCurrentVersion { first: true }
                } else {
                    tracing::info!(%dialect, "no schema ledger found, creating one");
                    State::ApplyNext(0)
                }
            }

            State::ReadCurrentVersion { first } => {
                let current = ledger.current_version(executor)?;
                if first {
                    report.from = Some(current);
                }
                match current.cmp(&code_version) {
                    Ordering::Equal => State::Done(current),
                    Ordering::Less => State::ApplyNext(current + 1),
                    Ordering::Greater if allow_rollback => State::RollbackCurrent(current),
                    Ordering::Greater => {
                        return Err(MigrationError::CodeTooOld {
                            database: current,
                            code: code_version,
                        })
                    }
                }
            }

            State::ApplyNext(version) => {
                let (apply, rollback) = &compiled[version];
                let now = canonical_timestamp(&Utc::now());
                let render = |query: &Query| {
                    query
                        .render_at(dialect, &[], now)
                        .map_err(|source| MigrationError::Render { version, source })
                };
                let script = render(apply)?;
                let rollback_script = render(rollback)?;

                let record = ledger
                    .insert
                    .render_at(
                        dialect,
                        &[
                            arg("version", version_value(version)),
                            arg("rollback_script", rollback_script.sql.trim()),
                            arg("applied", now),
                        ],
                        now,
                    )
                    .map_err(|source| MigrationError::Render { version, source })?;

                executor
                    .execute_atomic(&[Command::Script(&script.sql), Command::Statement(&record)])
                    .map_err(|source| MigrationError::Apply { version, source })?;

                tracing::info!(version, %dialect, "applied schema version");
                report.applied += 1;
                State::ReadCurrentVersion { first: false }
            }

            State::RollbackCurrent(version) => {
                let script = ledger
                    .rollback_script(executor, version)?
                    .ok_or(MigrationError::MissingRollback { version })?;
                let delete = ledger
                    .delete
                    .render(dialect, &[arg("version", version_value(version))])
                    .map_err(|source| MigrationError::Render { version, source })?;

                executor
                    .execute_atomic(&[Command::Script(&script), Command::Statement(&delete)])
                    .map_err(|source| MigrationError::Rollback { version, source })?;

                tracing::info!(version, %dialect, "rolled back schema version");
                report.rolled_back += 1;
                State::ReadCurrentVersion { first: false }
            }

            State::Done(version) => {
                if report.applied == 0 && report.rolled_back == 0 {
                    tracing::debug!(version, "schema is up to date");
                }
                report.to = version;
                return Ok(report);
            }
        };
    }
}

fn compile_versions(versions: &[SchemaVersion]) -> Result<Vec<(Query, Query)>, MigrationError> {
    if versions.is_empty() {
        return Err(MigrationError::NoVersions);
    }
    versions
        .iter()
        .enumerate()
        .map(|(version, v)| {
            let compile = |template: &str| {
                Query::compile(template)
                    .map_err(|source| MigrationError::Compile { version, source })
            };
            Ok((compile(v.apply)?, compile(v.rollback)?))
        })
        .collect()
}

fn version_value(version: usize) -> Value {
    // Version lists are nowhere near i64::MAX entries long.
    Value::Int(i64::try_from(version).unwrap_or(i64::MAX))
}

struct Ledger {
    exists: Query,
    current: Query,
    insert: Query,
    rollback: Query,
    delete: Query,
}

impl Ledger {
    fn compile() -> Result<Self, MigrationError> {
        let compile = |source: &str| Query::compile(source).map_err(MigrationError::LedgerTemplate);
        Ok(Self {
            exists: compile(
                "{{if sqlite}}\
                 select count(*) from sqlite_master where type = 'table' and name = 'schema_versions'\
                 {{else}}\
                 select count(*) from information_schema.tables where table_name = 'schema_versions'\
                 {{end}}",
            )?,
            current: compile("select max(version) from schema_versions")?,
            insert: compile(
                r#"insert into schema_versions (version, rollback_script, applied)
                   values ({{arg "version"}}, {{arg "rollback_script"}}, {{arg "applied"}})"#,
            )?,
            rollback: compile(
                r#"select rollback_script from schema_versions where version = {{arg "version"}}"#,
            )?,
            delete: compile(r#"delete from schema_versions where version = {{arg "version"}}"#)?,
        })
    }

    fn table_exists<E: Executor + ?Sized>(&self, executor: &E) -> Result<bool, MigrationError> {
        let row = self
            .exists
            .bind(executor)
            .query_row(&[], &[ColumnKind::Int])
            .map_err(MigrationError::Ledger)?;
        let count = row.and_then(|row| row.first().and_then(Value::as_int));
        Ok(count.unwrap_or(0) > 0)
    }

    fn current_version<E: Executor + ?Sized>(&self, executor: &E) -> Result<usize, MigrationError> {
        let row = self
            .current
            .bind(executor)
            .query_row(&[], &[ColumnKind::Int])
            .map_err(MigrationError::Ledger)?;
        match row.as_deref() {
            Some([Value::Int(version)]) => {
                usize::try_from(*version).map_err(|_| MigrationError::InvalidVersion(*version))
            }
            _ => Err(MigrationError::EmptyLedger),
        }
    }

    fn rollback_script<E: Executor + ?Sized>(
        &self,
        executor: &E,
        version: usize,
    ) -> Result<Option<String>, MigrationError> {
        let row = self
            .rollback
            .bind(executor)
            .query_row(&[arg("version", version_value(version))], &[ColumnKind::Text])
            .map_err(MigrationError::Ledger)?;
        Ok(row.and_then(|row| row.into_iter().next()).and_then(|value| match value {
            Value::Text(script) => Some(script),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    const VERSIONS: &[SchemaVersion] = &[
        LEDGER_VERSION,
        SchemaVersion {
            apply: "create table a (id {{int}} PRIMARY KEY NOT NULL)",
            rollback: "drop table a",
        },
        SchemaVersion {
            apply: "create table b (id {{id}} PRIMARY KEY NOT NULL, at {{datetime}})",
            rollback: "
                {{if sqlite}}
                    drop table b
                {{else}}
                    DROP TABLE IF EXISTS b
                {{end}}
            ",
        },
    ];

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    fn ledger_versions(conn: &Connection) -> Vec<i64> {
        let mut stmt = conn
            .prepare("SELECT version FROM schema_versions ORDER BY version")
            .expect("should prepare");
        stmt.query_map([], |row| row.get(0))
            .expect("should query ledger")
            .map(|r| r.expect("should read version"))
            .collect()
    }

    #[test]
    fn run_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let report = run_migrations_from_list(&conn, VERSIONS, false).expect("should migrate");

        assert_eq!(
            report,
            MigrationReport {
                from: None,
                to: 2,
                applied: 3,
                rolled_back: 0
            }
        );
        assert_eq!(ledger_versions(&conn), vec![0, 1, 2]);
        assert!(table_exists(&conn, "a"));
        assert!(table_exists(&conn, "b"));
    }

    #[test]
    fn run_migrations_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations_from_list(&conn, VERSIONS, false).expect("first run should succeed");

        let second = run_migrations_from_list(&conn, VERSIONS, false).expect("second run should succeed");
        assert_eq!(
            second,
            MigrationReport {
                from: Some(2),
                to: 2,
                applied: 0,
                rolled_back: 0
            }
        );
        assert_eq!(ledger_versions(&conn), vec![0, 1, 2]);
    }

    #[test]
    fn applies_only_newer_versions() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations_from_list(&conn, &VERSIONS[..2], false).expect("should migrate to 1");
        assert!(!table_exists(&conn, "b"));

        let report = run_migrations_from_list(&conn, VERSIONS, false).expect("should migrate to 2");
        assert_eq!(report.from, Some(1));
        assert_eq!(report.applied, 1);
        assert_eq!(ledger_versions(&conn), vec![0, 1, 2]);
    }

    #[test]
    fn stores_rendered_trimmed_rollback() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations_from_list(&conn, VERSIONS, false).expect("should migrate");

        let script: String = conn
            .query_row(
                "SELECT rollback_script FROM schema_versions WHERE version = 2",
                [],
                |row| row.get(0),
            )
            .expect("should read rollback script");
        assert_eq!(script, "drop table b");
    }

    #[test]
    fn rollback_runs_the_ledger_script() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations_from_list(&conn, VERSIONS, false).expect("should migrate");

        // The binary's own rollback template is never consulted.
        conn.execute(
            "UPDATE schema_versions SET rollback_script = ?1 WHERE version = 2",
            ["drop table b; create table rolled_back_marker (id integer)"],
        )
        .expect("should rewrite rollback script");

        let report = run_migrations_from_list(&conn, &VERSIONS[..2], true).expect("should roll back");
        assert_eq!(
            report,
            MigrationReport {
                from: Some(2),
                to: 1,
                applied: 0,
                rolled_back: 1
            }
        );
        assert!(!table_exists(&conn, "b"));
        assert!(table_exists(&conn, "rolled_back_marker"));
        assert_eq!(ledger_versions(&conn), vec![0, 1]);
    }

    #[test]
    fn newer_database_without_rollback_is_fatal() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations_from_list(&conn, VERSIONS, false).expect("should migrate");

        let err = run_migrations_from_list(&conn, &VERSIONS[..2], false)
            .expect_err("older code must not run against a newer schema");
        assert!(matches!(
            err,
            MigrationError::CodeTooOld {
                database: 2,
                code: 1
            }
        ));
        assert_eq!(ledger_versions(&conn), vec![0, 1, 2]);
        assert!(table_exists(&conn, "b"));
    }

    #[test]
    fn migration_side_effects_rollback_when_tracking_insert_fails() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let versions = [
            LEDGER_VERSION,
            SchemaVersion {
                apply: "
                    CREATE TABLE step_side_effect (id INTEGER PRIMARY KEY);
                    INSERT INTO schema_versions (version, rollback_script, applied)
                    VALUES (1, '', '2020-01-01 00:00:00.000000');
                ",
                rollback: "DROP TABLE step_side_effect",
            },
        ];

        let err = run_migrations_from_list(&conn, &versions, false)
            .expect_err("tracking insert conflict should fail migration");

        match err {
            MigrationError::Apply { version, .. } => assert_eq!(version, 1),
            other => panic!("unexpected error type: {other:?}"),
        }

        assert!(
            !table_exists(&conn, "step_side_effect"),
            "schema side effects should be rolled back when tracking insert fails"
        );
        assert_eq!(ledger_versions(&conn), vec![0]);
    }

    #[test]
    fn compile_errors_abort_before_any_statement() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let versions = [
            LEDGER_VERSION,
            SchemaVersion {
                apply: "create table c (x {{float}})",
                rollback: "drop table c",
            },
        ];

        let err = run_migrations_from_list(&conn, &versions, false).expect_err("should not compile");
        assert!(matches!(err, MigrationError::Compile { version: 1, .. }));
        assert!(!table_exists(&conn, "schema_versions"));
    }

    #[test]
    fn empty_ledger_is_fatal() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.execute_batch(
            "CREATE TABLE schema_versions (version INTEGER PRIMARY KEY, rollback_script TEXT, applied DATETIME);",
        )
        .expect("should create ledger");

        let err = run_migrations_from_list(&conn, VERSIONS, false).expect_err("empty ledger");
        assert!(matches!(err, MigrationError::EmptyLedger));
    }

    #[test]
    fn empty_version_list_is_rejected() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let err = run_migrations_from_list(&conn, &[], false).expect_err("no versions");
        assert!(matches!(err, MigrationError::NoVersions));
    }
}
