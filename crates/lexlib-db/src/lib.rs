//! Database layer for Lex Library.
//!
//! One set of query definitions runs against every supported backend. Queries
//! are written as dialect-neutral templates, compiled once into a [`Query`]
//! and rendered per [`Dialect`](lexlib_types::Dialect) into SQL text plus
//! bound parameters. Schema changes are an append-only list of template
//! pairs applied by the migration runner and recorded, with their rendered
//! rollback scripts, in the `schema_versions` ledger.
//!
//! # Design decisions
//!
//! - **Dialect threaded explicitly**: resolved once from configuration and
//!   passed as a value; there is no process-wide switch.
//! - **Plans resolved at compile time**: template conditionals only test the
//!   dialect, so each dialect's statement shape is fixed when the template
//!   compiles and argument mistakes surface at load time.
//! - **SQLite with WAL mode behind `r2d2`**: the only linked driver. Other
//!   backends plug in through [`Executor`].

mod database;
mod debug;
mod error;
mod executor;
mod migrations;
mod pool;
pub mod schema;
mod stats;
mod template;
mod tx;
pub mod typemap;
mod value;

pub use database::Database;
pub use debug::debug_dump;
pub use error::DbError;
pub use executor::{BoundQuery, Command, Executor, Row};
pub use migrations::{
    run_migrations, run_migrations_from_list, MigrationError, MigrationReport, SchemaVersion,
    LEDGER_VERSION,
};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use stats::{size, SizeStats};
pub use template::{Params, Query, QueryContext, RenderError, Statement, TemplateError};
pub use tx::run_in_transaction;
pub use value::{
    arg, canonical_timestamp, format_timestamp, parse_timestamp, Arg, ArgValue, Value,
    TIMESTAMP_FORMAT,
};
