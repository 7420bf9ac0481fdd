//! Lex Library server binary.
//!
//! Loads configuration, installs structured logging, opens the database and
//! brings its schema to this build's version. Exits non-zero on any failure.

use std::process::ExitCode;

use lexlib_server::config;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("LEXLIB_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().unwrap_or("config.toml");

    let config = match config::load_config(Some(selected_config_path)) {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from this file, so report on stderr.
            eprintln!("failed to load configuration from {selected_config_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    lexlib_server::init_tracing(&config.logging);

    tracing::info!(
        source = config_source,
        path = selected_config_path,
        "resolved startup configuration path"
    );

    match lexlib_server::startup(&config) {
        Ok((db, _report)) => {
            tracing::info!(dialect = %db.dialect(), "lexlib started");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}
