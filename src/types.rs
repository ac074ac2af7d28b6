// src/types.rs

//! Shared value types used by the registry, the supervisor and the CLI.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SupervisorError};

/// Canonical job name type used throughout the crate.
pub type JobName = String;

/// Opaque key/value bag forwarded to a worker at spawn time.
///
/// The supervisor never interprets it; it is persisted in the registry,
/// exported to the child as JSON and handed back by `status`.
pub type LaunchParams = BTreeMap<String, serde_json::Value>;

static JOB_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").expect("job name regex is valid")
});

/// Check that `name` is usable as a job identifier.
///
/// Job names double as log file names, so path separators and leading dots
/// are rejected.
pub fn validate_job_name(name: &str) -> Result<()> {
    if JOB_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(SupervisorError::InvalidJobName(name.to_string()))
    }
}

/// The executable a job runs, plus how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl JobCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Run `command_line` through the platform shell (`sh -c` / `cmd /C`).
    pub fn shell(command_line: impl Into<String>) -> Self {
        if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(command_line)
        } else {
            Self::new("sh").arg("-c").arg(command_line)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// One registry entry.
///
/// `process_id`, `start_time` and `start_token` are fixed for the lifetime
/// of the record; a new start replaces the record wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub process_id: u32,
    pub start_time: DateTime<Utc>,
    /// OS-level start marker of the process, used to detect PID reuse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_token: Option<u64>,
    #[serde(default)]
    pub launch_parameters: LaunchParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<JobCommand>,
}

/// Result of `Supervisor::start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
    /// The OS refused to create the process. No registry entry was written
    /// and the log handle was released.
    SpawnFailed { reason: String },
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

/// Result of `Supervisor::stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited within the grace period.
    Stopped,
    /// Nothing was running under that name.
    NotRunning,
    /// The grace period elapsed and the process was killed unconditionally.
    ForceKilled,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopOutcome::Stopped => "stopped",
            StopOutcome::NotRunning => "not running",
            StopOutcome::ForceKilled => "force-killed",
        };
        f.write_str(s)
    }
}

/// Composed status of a single job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub name: JobName,
    pub running: bool,
    pub process_id: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub runtime: Option<Duration>,
    pub launch_parameters: Option<LaunchParams>,
}

impl JobStatus {
    pub fn not_running(name: impl Into<JobName>) -> Self {
        Self {
            name: name.into(),
            running: false,
            process_id: None,
            start_time: None,
            runtime: None,
            launch_parameters: None,
        }
    }

    pub fn from_record(name: impl Into<JobName>, record: &JobRecord, now: DateTime<Utc>) -> Self {
        let runtime = (now - record.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self {
            name: name.into(),
            running: true,
            process_id: Some(record.process_id),
            start_time: Some(record.start_time),
            runtime: Some(runtime),
            launch_parameters: Some(record.launch_parameters.clone()),
        }
    }

    /// Runtime rendered as `HH:MM:SS`, if running.
    pub fn runtime_display(&self) -> Option<String> {
        self.runtime.map(format_runtime)
    }
}

/// Aggregated result of `Supervisor::stop_all`.
#[derive(Debug, Default, Clone)]
pub struct StopAllReport {
    pub outcomes: BTreeMap<JobName, StopOutcome>,
    pub failures: BTreeMap<JobName, String>,
}

impl StopAllReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Format a duration as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_runtime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}
