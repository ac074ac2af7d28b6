// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::supervisor::{DEFAULT_PARAMS_ENV, SupervisorOptions};
use crate::types::{JobCommand, LaunchParams};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// state_dir = ".jobwarden"
/// grace_period = "10s"
///
/// [job.collector]
/// cmd = "python3"
/// args = ["scripts/run_news_collection.py"]
///
/// [job.collector.params]
/// keyword = "economy"
/// ```
///
/// This is the *raw* (unvalidated) form. Use `ConfigFile::try_from` (or
/// [`crate::config::load_and_validate`]) to obtain a validated config.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    /// All jobs from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// Validated configuration.
///
/// Can only be produced from a [`RawConfigFile`] via `TryFrom`, so holding
/// one means durations parsed and every job name is usable.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSettings,
    pub job: BTreeMap<String, JobConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        supervisor: SupervisorSettings,
        job: BTreeMap<String, JobConfig>,
    ) -> Self {
        Self { supervisor, job }
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.job.keys().map(String::as_str)
    }
}

/// `[supervisor]` section, as written.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Directory holding `registry.json` and `logs/`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Default grace period for `stop` / `stop-all` (e.g. `"10s"`).
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Liveness polling interval while waiting for an exit.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// How long to wait for a killed process to disappear.
    #[serde(default = "default_kill_confirm")]
    pub kill_confirm: String,

    /// Environment variable the JSON launch parameters are exported under.
    #[serde(default = "default_params_env")]
    pub params_env: String,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".jobwarden")
}

fn default_grace_period() -> String {
    "10s".to_string()
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

fn default_kill_confirm() -> String {
    "5s".to_string()
}

fn default_params_env() -> String {
    DEFAULT_PARAMS_ENV.to_string()
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            grace_period: default_grace_period(),
            poll_interval: default_poll_interval(),
            kill_confirm: default_kill_confirm(),
            params_env: default_params_env(),
        }
    }
}

/// `[supervisor]` after validation.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub state_dir: PathBuf,
    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub kill_confirm: Duration,
    pub params_env: String,
}

impl SupervisorSettings {
    pub fn options(&self) -> SupervisorOptions {
        SupervisorOptions {
            default_grace: self.grace_period,
            poll_interval: self.poll_interval,
            kill_confirm: self.kill_confirm,
            params_env: self.params_env.clone(),
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Executable to run.
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory; relative paths are resolved by the caller.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment for the worker.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Default launch parameters; CLI `--param` values override them.
    #[serde(default)]
    pub params: LaunchParams,
}

impl JobConfig {
    pub fn command(&self) -> JobCommand {
        let mut command = JobCommand::new(&self.cmd).args(self.args.iter().cloned());
        command.cwd = self.cwd.clone();
        command.env = self.env.clone();
        command
    }
}
