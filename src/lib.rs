// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod logsink;
pub mod process;
pub mod registry;
pub mod supervisor;
pub mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_and_validate};
use crate::errors::SupervisorError;
use crate::types::{JobCommand, JobName, JobStatus, LaunchParams, StartOutcome, parse_duration};

pub use crate::supervisor::{Supervisor, SupervisorOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor rooted at the configured state directory
/// - the requested subcommand (defaults to `status`)
///
/// Supervisor calls block on OS work, so each one is dispatched with
/// `spawn_blocking`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {:?}", config_path))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let root = config_root_dir(&config_path);
    let state_dir = resolve_against(&root, &cfg.supervisor.state_dir);
    let options = cfg.supervisor.options();
    let known: Vec<JobName> = cfg.job.keys().cloned().collect();

    debug!(state_dir = ?state_dir, "opening supervisor");
    let supervisor = blocking(move || {
        let supervisor = Supervisor::open(state_dir, options);
        supervisor.register_known(known);
        supervisor
    })
    .await?;
    let supervisor = Arc::new(supervisor);

    let command = args.command.unwrap_or(Command::Status {
        job: None,
        watch: false,
    });

    match command {
        Command::Start { job, params } => {
            let (command, params) = resolve_start(&cfg, &root, &job, &params)?;
            let sup = Arc::clone(&supervisor);
            let name = job.clone();
            let outcome = blocking(move || sup.start(&name, &command, params)).await??;
            match outcome {
                StartOutcome::Started { pid } => println!("{job}: started (pid {pid})"),
                StartOutcome::AlreadyRunning { pid } => {
                    println!("{job}: already running (pid {pid})")
                }
                StartOutcome::SpawnFailed { reason } => {
                    bail!("{job}: failed to start: {reason}")
                }
            }
        }
        Command::Stop { job, grace } => {
            ensure_known(&cfg, &job)?;
            let grace = match grace {
                Some(s) => parse_duration(&s).map_err(|e| anyhow::anyhow!("--grace: {e}"))?,
                None => supervisor.options().default_grace,
            };
            let sup = Arc::clone(&supervisor);
            let name = job.clone();
            let outcome = blocking(move || sup.stop(&name, grace)).await??;
            println!("{job}: {outcome}");
        }
        Command::Status { job, watch } => {
            if let Some(ref job) = job {
                ensure_known(&cfg, job)?;
            }
            if watch {
                watch_status(&supervisor, job).await?;
            } else {
                let statuses = collect_status(&supervisor, job).await?;
                print_status_table(&statuses);
            }
        }
        Command::Logs { job, lines } => {
            ensure_known(&cfg, &job)?;
            let sup = Arc::clone(&supervisor);
            let name = job.clone();
            let lines = blocking(move || sup.logs(&name, lines)).await??;
            for line in lines {
                println!("{line}");
            }
        }
        Command::StopAll => {
            let sup = Arc::clone(&supervisor);
            let report = blocking(move || sup.stop_all()).await?;
            if report.outcomes.is_empty() && report.failures.is_empty() {
                println!("no jobs running");
            }
            for (name, outcome) in &report.outcomes {
                println!("{name}: {outcome}");
            }
            for (name, reason) in &report.failures {
                eprintln!("{name}: stop failed: {reason}");
            }
            if !report.is_clean() {
                bail!("{} job(s) could not be stopped", report.failures.len());
            }
        }
        Command::Jobs => {
            for (name, job) in &cfg.job {
                println!("{name}\t{}", job.command());
            }
        }
    }

    Ok(())
}

/// Run a blocking supervisor call on Tokio's blocking pool.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("supervisor task panicked")
}

fn ensure_known(cfg: &ConfigFile, job: &str) -> std::result::Result<(), SupervisorError> {
    if cfg.job.contains_key(job) {
        Ok(())
    } else {
        Err(SupervisorError::UnknownJob(job.to_string()))
    }
}

/// Build the command and effective launch parameters for `job`:
/// configured defaults, overridden by `KEY=VALUE` pairs.
fn resolve_start(
    cfg: &ConfigFile,
    root: &Path,
    job: &str,
    overrides: &[String],
) -> Result<(JobCommand, LaunchParams)> {
    let job_cfg = cfg
        .job
        .get(job)
        .ok_or_else(|| SupervisorError::UnknownJob(job.to_string()))?;

    let mut command = job_cfg.command();
    if let Some(ref cwd) = command.cwd {
        command.cwd = Some(resolve_against(root, cwd));
    }

    let mut params = job_cfg.params.clone();
    for pair in overrides {
        let (key, value) = parse_param(pair)?;
        params.insert(key, value);
    }
    Ok((command, params))
}

/// Parse `KEY=VALUE`. VALUE is read as JSON if it parses, else as a string.
pub fn parse_param(pair: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("invalid parameter {pair:?}; expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid parameter {pair:?}; empty key");
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

async fn collect_status(
    supervisor: &Arc<Supervisor>,
    job: Option<String>,
) -> Result<BTreeMap<JobName, JobStatus>> {
    let sup = Arc::clone(supervisor);
    blocking(move || match job {
        Some(name) => sup
            .status(&name)
            .map(|status| BTreeMap::from([(name, status)])),
        None => Ok(sup.status_all()),
    })
    .await?
    .map_err(Into::into)
}

async fn watch_status(supervisor: &Arc<Supervisor>, job: Option<String>) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    info!("watching job status; Ctrl-C to exit");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let statuses = collect_status(supervisor, job.clone()).await?;
                print_status_table(&statuses);
                println!();
            }
            res = tokio::signal::ctrl_c() => {
                res.context("listening for Ctrl-C")?;
                return Ok(());
            }
        }
    }
}

fn print_status_table(statuses: &BTreeMap<JobName, JobStatus>) {
    println!(
        "{:<20} {:<8} {:>8} {:>10}  STARTED",
        "JOB", "STATUS", "PID", "RUNTIME"
    );
    for (name, status) in statuses {
        let state = if status.running { "running" } else { "stopped" };
        let pid = status
            .process_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let runtime = status.runtime_display().unwrap_or_else(|| "-".to_string());
        let started = status
            .start_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{name:<20} {state:<8} {pid:>8} {runtime:>10}  {started}");
    }
}

/// Directory relative paths in the config are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "deploy/Jobwarden.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Jobwarden.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Simple dry-run output: print supervisor settings and jobs.
fn print_dry_run(cfg: &ConfigFile) {
    println!("jobwarden dry-run");
    println!("  supervisor.state_dir = {:?}", cfg.supervisor.state_dir);
    println!("  supervisor.grace_period = {:?}", cfg.supervisor.grace_period);
    println!("  supervisor.poll_interval = {:?}", cfg.supervisor.poll_interval);
    println!("  supervisor.kill_confirm = {:?}", cfg.supervisor.kill_confirm);
    println!("  supervisor.params_env = {}", cfg.supervisor.params_env);
    println!();

    println!("jobs ({}):", cfg.job.len());
    for (name, job) in cfg.job.iter() {
        println!("  - {name}");
        println!("      cmd: {}", job.command());
        if let Some(ref cwd) = job.cwd {
            println!("      cwd: {:?}", cwd);
        }
        if !job.env.is_empty() {
            println!("      env: {:?}", job.env);
        }
        if !job.params.is_empty() {
            println!("      params: {}", serde_json::to_string(&job.params).unwrap_or_default());
        }
    }

    debug!("dry-run complete (no process touched)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_as_json_or_string() {
        assert_eq!(parse_param("count=10").unwrap(), ("count".into(), serde_json::json!(10)));
        assert_eq!(
            parse_param("keyword=economy").unwrap(),
            ("keyword".into(), serde_json::json!("economy"))
        );
        assert_eq!(parse_param("q=a=b").unwrap(), ("q".into(), serde_json::json!("a=b")));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let root = Path::new("/srv/app");
        assert_eq!(resolve_against(root, Path::new(".state")), PathBuf::from("/srv/app/.state"));
        assert_eq!(resolve_against(root, Path::new("/var/lib/x")), PathBuf::from("/var/lib/x"));
    }
}
