// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Largest `--lines` value accepted by `jobwarden logs`.
pub const MAX_LOG_LINES: usize = 1000;

/// Command-line arguments for `jobwarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobwarden",
    version,
    about = "Start, stop and inspect long-running background jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBWARDEN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print the jobs, but don't touch any
    /// process.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start a configured job.
    Start {
        /// Job name from `[job.<name>]`.
        job: String,

        /// Launch parameter override, `KEY=VALUE`. VALUE is parsed as JSON
        /// when possible (`count=10`), otherwise taken as a string.
        #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Stop a job: graceful request, then kill after the grace period.
    Stop {
        job: String,

        /// Grace period (e.g. `5s`); defaults to `[supervisor].grace_period`.
        #[arg(long, value_name = "DURATION")]
        grace: Option<String>,
    },

    /// Show job status (all configured jobs if no name is given).
    Status {
        job: Option<String>,

        /// Keep refreshing every second until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },

    /// Print the last lines of a job's output.
    Logs {
        job: String,

        #[arg(long, short = 'n', default_value_t = 50, value_parser = parse_line_count)]
        lines: usize,
    },

    /// Stop every running job.
    StopAll,

    /// List configured jobs.
    Jobs,
}

fn parse_line_count(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|e| format!("invalid line count '{s}': {e}"))?;
    if (1..=MAX_LOG_LINES).contains(&n) {
        Ok(n)
    } else {
        Err(format!("lines must be between 1 and {MAX_LOG_LINES}"))
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_params() {
        let args = CliArgs::try_parse_from([
            "jobwarden",
            "start",
            "collector",
            "-p",
            "keyword=economy",
            "--param",
            "count=10",
        ])
        .unwrap();
        match args.command {
            Some(Command::Start { job, params }) => {
                assert_eq!(job, "collector");
                assert_eq!(params, vec!["keyword=economy", "count=10"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_defaults_to_jobwarden_toml() {
        let args = CliArgs::try_parse_from(["jobwarden", "jobs"]).unwrap();
        assert_eq!(args.config, default_config_path());
        let args = CliArgs::try_parse_from(["jobwarden", "--config", "deploy/jw.toml", "jobs"]).unwrap();
        assert_eq!(args.config, PathBuf::from("deploy/jw.toml"));
    }

    #[test]
    fn log_line_count_is_bounded() {
        assert!(CliArgs::try_parse_from(["jobwarden", "logs", "collector", "-n", "0"]).is_err());
        assert!(CliArgs::try_parse_from(["jobwarden", "logs", "collector", "-n", "1001"]).is_err());
        let args = CliArgs::try_parse_from(["jobwarden", "logs", "collector"]).unwrap();
        assert!(matches!(args.command, Some(Command::Logs { lines: 50, .. })));
    }
}
