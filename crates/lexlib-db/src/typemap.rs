//! Column-type mapping and dialect literals.
//!
//! Pure functions from an abstract [`ColumnKind`] (or literal) to the DDL/SQL
//! fragment a dialect expects. Every `match` is exhaustive over [`Dialect`],
//! so adding a dialect without mapping it is a build failure rather than a
//! runtime surprise.
//!
//! Conventions the mappings follow:
//!
//! - text is case-sensitive unicode;
//! - timestamps are stored in UTC with at least microsecond precision;
//! - binary data has no size limit;
//! - integers are 64 bit.

use chrono::{DateTime, Utc};
use lexlib_types::{ColumnKind, Dialect, ID_LENGTH};

use crate::value::format_timestamp;

/// Returns the column type for `kind` in `dialect`.
pub fn column_type(kind: ColumnKind, dialect: Dialect) -> String {
    match kind {
        ColumnKind::Text => text_column(dialect).to_string(),
        ColumnKind::VarChar(size) => varchar_column(size, dialect),
        ColumnKind::Bytes => bytes_column(dialect).to_string(),
        ColumnKind::Bool => bool_column(dialect).to_string(),
        ColumnKind::Int => int_column(dialect).to_string(),
        ColumnKind::DateTime => datetime_column(dialect).to_string(),
        ColumnKind::Id => varchar_column(ID_LENGTH, dialect),
    }
}

fn text_column(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite
        | Dialect::Postgres
        | Dialect::Cockroachdb
        | Dialect::Mysql
        | Dialect::Mariadb => "TEXT",
        Dialect::Sqlserver => "nvarchar(max)",
    }
}

fn varchar_column(size: u32, dialect: Dialect) -> String {
    match dialect {
        Dialect::Postgres | Dialect::Cockroachdb | Dialect::Mysql | Dialect::Mariadb => {
            format!("varchar({size})")
        }
        // SQLite does not enforce declared lengths.
        Dialect::Sqlite => "TEXT".to_string(),
        Dialect::Sqlserver => format!("nvarchar({size})"),
    }
}

fn bytes_column(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "BLOB",
        Dialect::Postgres => "BYTEA",
        Dialect::Cockroachdb => "BYTES",
        Dialect::Mysql | Dialect::Mariadb => "LONGBLOB",
        Dialect::Sqlserver => "VARBINARY(max)",
    }
}

fn bool_column(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres | Dialect::Cockroachdb | Dialect::Mysql | Dialect::Mariadb => "boolean",
        Dialect::Sqlserver => "bit",
        Dialect::Sqlite => "INTEGER",
    }
}

fn int_column(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "INTEGER",
        Dialect::Postgres
        | Dialect::Cockroachdb
        | Dialect::Mysql
        | Dialect::Mariadb
        | Dialect::Sqlserver => "bigint",
    }
}

fn datetime_column(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "DATETIME",
        Dialect::Postgres | Dialect::Cockroachdb => "TIMESTAMP WITH TIME ZONE",
        Dialect::Mysql | Dialect::Mariadb => "DATETIME(6)",
        Dialect::Sqlserver => "DATETIMEOFFSET",
    }
}

/// Boolean literal: `true`/`false` where booleans are native, `1`/`0`
/// elsewhere.
pub fn bool_literal(value: bool, dialect: Dialect) -> &'static str {
    match (dialect.has_native_bool(), value) {
        (true, true) => "true",
        (true, false) => "false",
        (false, true) => "1",
        (false, false) => "0",
    }
}

/// Timestamp literal for `at`, in the same canonical text form the binder
/// uses for timestamp parameters.
pub fn timestamp_literal(at: &DateTime<Utc>, dialect: Dialect) -> String {
    let text = format_timestamp(at);
    match dialect {
        Dialect::Sqlite => format!("'{text}'"),
        Dialect::Postgres | Dialect::Cockroachdb => format!("TIMESTAMP WITH TIME ZONE '{text}+00'"),
        Dialect::Mysql | Dialect::Mariadb => format!("TIMESTAMP '{text}'"),
        Dialect::Sqlserver => format!("CAST('{text} +00:00' AS DATETIMEOFFSET)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_kind_maps_for_every_dialect() {
        let kinds = [
            ColumnKind::Text,
            ColumnKind::VarChar(10),
            ColumnKind::Bytes,
            ColumnKind::Bool,
            ColumnKind::Int,
            ColumnKind::DateTime,
            ColumnKind::Id,
        ];
        for dialect in Dialect::ALL {
            for kind in kinds {
                assert!(
                    !column_type(kind, dialect).is_empty(),
                    "{kind:?} has no mapping for {dialect}"
                );
            }
        }
    }

    #[test]
    fn bounded_text_carries_its_size() {
        assert_eq!(
            column_type(ColumnKind::VarChar(64), Dialect::Postgres),
            "varchar(64)"
        );
        assert_eq!(
            column_type(ColumnKind::VarChar(64), Dialect::Sqlserver),
            "nvarchar(64)"
        );
        assert_eq!(column_type(ColumnKind::VarChar(64), Dialect::Sqlite), "TEXT");
        assert_eq!(column_type(ColumnKind::Id, Dialect::Mysql), "varchar(36)");
    }

    #[test]
    fn binary_types_differ_per_backend() {
        assert_eq!(column_type(ColumnKind::Bytes, Dialect::Postgres), "BYTEA");
        assert_eq!(column_type(ColumnKind::Bytes, Dialect::Cockroachdb), "BYTES");
        assert_eq!(
            column_type(ColumnKind::Bytes, Dialect::Sqlserver),
            "VARBINARY(max)"
        );
    }

    #[test]
    fn boolean_literals_follow_native_support() {
        assert_eq!(bool_literal(true, Dialect::Sqlite), "1");
        assert_eq!(bool_literal(false, Dialect::Sqlserver), "0");
        assert_eq!(bool_literal(true, Dialect::Postgres), "true");
        assert_eq!(bool_literal(false, Dialect::Mariadb), "false");
    }

    #[test]
    fn timestamp_literals_use_canonical_text() {
        let at = Utc
            .with_ymd_and_hms(2018, 3, 4, 5, 6, 7)
            .single()
            .expect("valid date");
        assert_eq!(
            timestamp_literal(&at, Dialect::Sqlite),
            "'2018-03-04 05:06:07.000000'"
        );
        assert_eq!(
            timestamp_literal(&at, Dialect::Mysql),
            "TIMESTAMP '2018-03-04 05:06:07.000000'"
        );
        assert_eq!(
            timestamp_literal(&at, Dialect::Sqlserver),
            "CAST('2018-03-04 05:06:07.000000 +00:00' AS DATETIMEOFFSET)"
        );
    }
}
