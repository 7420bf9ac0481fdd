//! Shared types and constants for the Lex Library data layer.
//!
//! This crate provides the vocabulary used across the workspace: the set of
//! supported SQL dialects and their placeholder conventions, the abstract
//! column kinds that schema templates are written against, the global
//! identifier type, and the field length limits that bounded text columns
//! are sized from.
//!
//! Nothing here touches a database. The dialect is plain data that callers
//! resolve once from configuration and then pass explicitly to the renderer
//! and type mapper, so several dialects can coexist in one process (tests
//! render every dialect side by side).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod limits;
pub use limits::{field_limit, validate_field, FieldError, FieldLimit};

/// A supported SQL backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dialect {
    /// SQLite 3.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL.
    Mysql,
    /// MariaDB.
    Mariadb,
    /// Microsoft SQL Server.
    Sqlserver,
    /// CockroachDB (PostgreSQL wire protocol).
    Cockroachdb,
}

/// How a dialect spells a bind parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// A single repeated `?` marker; parameters bind strictly by position.
    Question,
    /// Sequential `$1`, `$2`, ... markers; parameters bind by position.
    Numbered,
    /// `@name` markers; parameters bind by name.
    Named,
}

/// Error returned when a database kind string names no known dialect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown database kind '{0}'")]
pub struct UnknownDialect(pub String);

impl Dialect {
    /// Every supported dialect, in registry order.
    pub const ALL: [Dialect; 6] = [
        Dialect::Sqlite,
        Dialect::Postgres,
        Dialect::Mysql,
        Dialect::Mariadb,
        Dialect::Sqlserver,
        Dialect::Cockroachdb,
    ];

    /// Position of this dialect in [`Dialect::ALL`].
    pub fn index(self) -> usize {
        match self {
            Self::Sqlite => 0,
            Self::Postgres => 1,
            Self::Mysql => 2,
            Self::Mariadb => 3,
            Self::Sqlserver => 4,
            Self::Cockroachdb => 5,
        }
    }

    /// Canonical lowercase name, also used as the template predicate name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Sqlserver => "sqlserver",
            Self::Cockroachdb => "cockroachdb",
        }
    }

    /// Looks up a dialect by its canonical name only (no aliases).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Placeholder syntax this dialect's driver expects.
    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::Sqlite | Self::Mysql | Self::Mariadb => PlaceholderStyle::Question,
            Self::Postgres | Self::Cockroachdb => PlaceholderStyle::Numbered,
            Self::Sqlserver => PlaceholderStyle::Named,
        }
    }

    /// Whether booleans are a native type rather than a 0/1 integer.
    pub fn has_native_bool(self) -> bool {
        match self {
            Self::Postgres | Self::Cockroachdb | Self::Mysql | Self::Mariadb => true,
            Self::Sqlite | Self::Sqlserver => false,
        }
    }

    /// Whether DDL statements participate in transactions.
    ///
    /// MySQL and MariaDB commit implicitly around DDL.
    pub fn supports_transactional_ddl(self) -> bool {
        match self {
            Self::Sqlite | Self::Postgres | Self::Sqlserver | Self::Cockroachdb => true,
            Self::Mysql | Self::Mariadb => false,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = UnknownDialect;

    /// Parses a configuration "database kind", case-insensitively and
    /// accepting the common aliases operators tend to write.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let dialect = match lowered.as_str() {
            "sqlite" | "sqlite3" => Self::Sqlite,
            "postgres" | "postgresql" | "pg" => Self::Postgres,
            "mysql" => Self::Mysql,
            "mariadb" => Self::Mariadb,
            "sqlserver" | "mssql" => Self::Sqlserver,
            "cockroachdb" | "cockroach" => Self::Cockroachdb,
            _ => return Err(UnknownDialect(s.to_string())),
        };
        Ok(dialect)
    }
}

impl TryFrom<String> for Dialect {
    type Error = UnknownDialect;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dialect> for String {
    fn from(value: Dialect) -> Self {
        value.name().to_string()
    }
}

/// Abstract column kinds that schema templates are written against.
///
/// The type mapper in `lexlib-db` turns each kind into a dialect-specific
/// DDL fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Unbounded, case-sensitive unicode text.
    Text,
    /// Case-sensitive unicode text limited to the given number of characters.
    VarChar(u32),
    /// Unbounded binary data.
    Bytes,
    /// Non-null true/false.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// Date and time stored in UTC with microsecond precision.
    DateTime,
    /// Globally unique identifier.
    Id,
}

/// Length of the textual form of an [`Id`].
pub const ID_LENGTH: u32 = 36;

/// A globally unique identifier, stored in its hyphenated textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_index_matches_registry_order() {
        for (i, dialect) in Dialect::ALL.into_iter().enumerate() {
            assert_eq!(dialect.index(), i);
            assert_eq!(Dialect::from_name(dialect.name()), Some(dialect));
        }
    }

    #[test]
    fn dialect_parses_aliases_case_insensitively() {
        assert_eq!("SQLite".parse::<Dialect>(), Ok(Dialect::Sqlite));
        assert_eq!("PostgreSQL".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("mssql".parse::<Dialect>(), Ok(Dialect::Sqlserver));
        assert_eq!(" cockroach ".parse::<Dialect>(), Ok(Dialect::Cockroachdb));
        assert_eq!(
            "oracle".parse::<Dialect>(),
            Err(UnknownDialect("oracle".to_string()))
        );
    }

    #[test]
    fn dialect_serde_uses_kind_strings() {
        let parsed: Dialect = serde_json::from_str("\"MariaDB\"").expect("should parse");
        assert_eq!(parsed, Dialect::Mariadb);
        let written = serde_json::to_string(&Dialect::Sqlserver).expect("should serialize");
        assert_eq!(written, "\"sqlserver\"");
        assert!(serde_json::from_str::<Dialect>("\"db2\"").is_err());
    }

    #[test]
    fn placeholder_styles() {
        assert_eq!(
            Dialect::Sqlite.placeholder_style(),
            PlaceholderStyle::Question
        );
        assert_eq!(
            Dialect::Mysql.placeholder_style(),
            PlaceholderStyle::Question
        );
        assert_eq!(
            Dialect::Cockroachdb.placeholder_style(),
            PlaceholderStyle::Numbered
        );
        assert_eq!(
            Dialect::Sqlserver.placeholder_style(),
            PlaceholderStyle::Named
        );
    }

    #[test]
    fn id_text_round_trip() {
        let id = Id::new();
        let text = id.to_string();
        assert_eq!(text.len(), ID_LENGTH as usize);
        assert_eq!(text.parse::<Id>().expect("should parse"), id);
        assert!("not-an-id".parse::<Id>().is_err());
    }
}
