// src/logging.rs

//! Diagnostic logging for the `jobwarden` binary.
//!
//! The filter comes from, in order:
//! 1. `--log-level` (applies to every target)
//! 2. `JOBWARDEN_LOG`, in `EnvFilter` directive syntax
//!    (`debug`, `jobwarden::registry=trace,info`, ...)
//! 3. `info`
//!
//! Output goes to stderr. Stdout is reserved for status tables and log tails.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "JOBWARDEN_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Call once, before the first command runs.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let (filter, rejected) = build_filter(cli_level, env_value.as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let Some(bad) = rejected {
        tracing::warn!(value = %bad, "ignoring invalid {LOG_ENV}; using {DEFAULT_DIRECTIVE}");
    }
    Ok(())
}

/// Filter for the given inputs, plus the env value if it had to be ignored.
fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> (EnvFilter, Option<String>) {
    if let Some(level) = cli_level {
        return (EnvFilter::new(directive_for(level)), None);
    }
    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => match EnvFilter::try_new(value) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(DEFAULT_DIRECTIVE), Some(value.to_string())),
        },
        None => (EnvFilter::new(DEFAULT_DIRECTIVE), None),
    }
}

fn directive_for(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
