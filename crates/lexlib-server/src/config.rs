//! Configuration loading from file and environment variables.

use std::time::Duration;

use lexlib_db::DbRuntimeSettings;
use lexlib_types::Dialect;
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Backend kind (`sqlite`, `postgres`, `mysql`, `mariadb`, `sqlserver`,
    /// `cockroachdb`).
    #[serde(default = "default_kind")]
    pub kind: Dialect,

    /// Connection URL; for SQLite, a file path or `file:` URI.
    #[serde(default = "default_url")]
    pub url: String,

    /// Whether a database newer than this build may be rolled back.
    #[serde(default)]
    pub allow_schema_rollback: bool,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Idle connections to keep open.
    #[serde(default)]
    pub pool_min_idle: Option<u32>,

    /// Maximum connection lifetime, in seconds.
    #[serde(default)]
    pub max_connection_lifetime_secs: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "lexlib_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_kind() -> Dialect {
    Dialect::Sqlite
}

fn default_url() -> String {
    "lexlib.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            url: default_url(),
            allow_schema_rollback: false,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            pool_min_idle: None,
            max_connection_lifetime_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    /// Pool and connection tunables.
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            pool_min_idle: self.pool_min_idle,
            max_connection_lifetime: self.max_connection_lifetime_secs.map(Duration::from_secs),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override holds a value that cannot be used.
    #[error("invalid value '{value}' for {key}")]
    InvalidOverride {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LEXLIB_DB_KIND` overrides `database.kind`
/// - `LEXLIB_DB_URL` overrides `database.url`
/// - `LEXLIB_DB_ALLOW_ROLLBACK` overrides `database.allow_schema_rollback`
/// - `LEXLIB_LOG_LEVEL` overrides `logging.level`
/// - `LEXLIB_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if `LEXLIB_DB_KIND` names no known dialect.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Applies overrides looked up by variable name.
///
/// # Errors
///
/// Returns `ConfigError::InvalidOverride` for an unknown database kind.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(kind) = lookup("LEXLIB_DB_KIND") {
        config.database.kind = kind.parse().map_err(|_| ConfigError::InvalidOverride {
            key: "LEXLIB_DB_KIND",
            value: kind,
        })?;
    }
    if let Some(url) = lookup("LEXLIB_DB_URL") {
        config.database.url = url;
    }
    if let Some(allow) = lookup("LEXLIB_DB_ALLOW_ROLLBACK") {
        config.database.allow_schema_rollback = allow == "true" || allow == "1";
    }
    if let Some(level) = lookup("LEXLIB_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("LEXLIB_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    Ok(())
}
