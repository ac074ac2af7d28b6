// src/supervisor/mod.rs

//! Public supervision API.
//!
//! A [`Supervisor`] starts named jobs as detached processes, reports their
//! status from the shared [`Registry`], tails their logs and stops them
//! (see [`stop`] for the stop state machine). All methods take `&self` and
//! are safe to call from any thread; `start` and `stop` block on OS calls,
//! so async callers should dispatch them with `spawn_blocking`.
//!
//! The registry on disk is the source of truth for every query, which is
//! what lets a freshly constructed supervisor pick up jobs started by a
//! previous instance.

pub mod stop;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::logsink::LogSink;
use crate::process::{PlatformControl, ProcessControl, spawn_detached, spawn_reaper};
use crate::registry::{Registry, RegistryView, Reserve};
use crate::types::{
    JobCommand, JobName, JobRecord, JobStatus, LaunchParams, StartOutcome, validate_job_name,
};

/// Environment variable the launch parameters are exported under by default.
pub const DEFAULT_PARAMS_ENV: &str = "PROCESS_CONFIG";

/// Name of the log directory inside the state directory.
pub const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Grace period used by `stop_all` and `stop_default`.
    pub default_grace: Duration,
    /// How often liveness is polled while waiting for an exit.
    pub poll_interval: Duration,
    /// Upper bound on waiting for a killed process to disappear.
    pub kill_confirm: Duration,
    /// Environment variable carrying the JSON launch parameters.
    pub params_env: String,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            default_grace: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            kill_confirm: Duration::from_secs(5),
            params_env: DEFAULT_PARAMS_ENV.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct Supervisor {
    registry: Arc<Registry>,
    logs: LogSink,
    control: Arc<dyn ProcessControl>,
    options: SupervisorOptions,
    /// Every name this instance has seen, so `status_all` can report jobs
    /// that were reconciled away as not running.
    known: Mutex<BTreeSet<JobName>>,
    /// Serialises concurrent stops of the same job.
    stop_locks: Mutex<HashMap<JobName, Arc<Mutex<()>>>>,
}

impl Supervisor {
    /// Build a supervisor on top of an existing registry and log sink, using
    /// the platform's signalling. Reconciles the registry immediately.
    pub fn new(registry: Arc<Registry>, logs: LogSink, options: SupervisorOptions) -> Self {
        Self::with_control(registry, logs, Arc::new(PlatformControl), options)
    }

    pub fn with_control(
        registry: Arc<Registry>,
        logs: LogSink,
        control: Arc<dyn ProcessControl>,
        options: SupervisorOptions,
    ) -> Self {
        let supervisor = Self {
            registry,
            logs,
            control,
            options,
            known: Mutex::new(BTreeSet::new()),
            stop_locks: Mutex::new(HashMap::new()),
        };
        supervisor.reconcile();
        supervisor
    }

    /// Supervisor rooted at `state_dir`: `<state_dir>/registry.json` plus
    /// `<state_dir>/logs/<job>.log`.
    pub fn open(state_dir: impl AsRef<Path>, options: SupervisorOptions) -> Self {
        let state_dir = state_dir.as_ref();
        let registry = Arc::new(Registry::in_state_dir(state_dir));
        let logs = LogSink::new(state_dir.join(LOG_DIR_NAME));
        Self::new(registry, logs, options)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn log_sink(&self) -> &LogSink {
        &self.logs
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Add names that `status_all` should always report, e.g. the jobs
    /// declared in the configuration.
    pub fn register_known<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<JobName>,
    {
        self.known_set().extend(names.into_iter().map(Into::into));
    }

    /// Drop registry entries whose process is gone.
    ///
    /// Runs once at construction; every read does the same thing lazily.
    pub fn reconcile(&self) -> RegistryView {
        let view = self.registry.read_all();
        for (name, record) in &view.live {
            info!(job = %name, pid = record.process_id, started = %record.start_time, "found running job");
        }
        self.remember_view(&view);
        view
    }

    /// Start `name` by running `command` with `params`.
    ///
    /// Returns `AlreadyRunning` without side effects if a live entry exists,
    /// and `SpawnFailed` (with no registry entry and no open log handle) if
    /// the OS refuses to create the process. `Err` means the registry or
    /// log directory could not be written.
    pub fn start(
        &self,
        name: &str,
        command: &JobCommand,
        params: LaunchParams,
    ) -> Result<StartOutcome> {
        validate_job_name(name)?;
        self.remember(name);

        let reservation = match self.registry.reserve(name)? {
            Reserve::Reserved(reservation) => reservation,
            Reserve::AlreadyActive(existing) => {
                info!(job = %name, pid = existing.process_id, "job already running");
                return Ok(StartOutcome::AlreadyRunning {
                    pid: existing.process_id,
                });
            }
        };

        let log = match self.logs.open(name) {
            Ok(log) => log,
            Err(e) => {
                if let Err(abort_err) = reservation.abort() {
                    warn!(job = %name, error = %abort_err, "failed to release reservation");
                }
                return Err(e);
            }
        };

        let child = match spawn_detached(name, command, &params, &self.options.params_env, log) {
            Ok(child) => child,
            Err(e) => {
                self.logs.close(name);
                if let Err(abort_err) = reservation.abort() {
                    warn!(job = %name, error = %abort_err, "failed to release reservation");
                }
                warn!(job = %name, cmd = %command, error = %e, "failed to spawn job");
                return Ok(StartOutcome::SpawnFailed {
                    reason: e.to_string(),
                });
            }
        };

        let pid = child.id();
        let record = JobRecord {
            process_id: pid,
            start_time: Utc::now(),
            start_token: self.registry.liveness().start_token(pid),
            launch_parameters: params,
            command: Some(command.clone()),
        };

        if let Err(e) = reservation.commit(record) {
            // Nothing on disk refers to the worker; do not leave it running
            // untracked.
            error!(job = %name, pid, error = %e, "could not record job; killing it");
            if let Err(kill_err) = self.control.force_kill(pid) {
                warn!(job = %name, pid, error = %kill_err, "failed to kill unrecorded job");
            }
            spawn_reaper(name, child);
            self.logs.close(name);
            return Err(e);
        }

        spawn_reaper(name, child);
        info!(job = %name, pid, "job started");
        Ok(StartOutcome::Started { pid })
    }

    /// Liveness-validated status of one job.
    pub fn status(&self, name: &str) -> Result<JobStatus> {
        validate_job_name(name)?;
        let view = self.registry.read_all();
        self.remember_view(&view);
        Ok(compose_status(name, &view))
    }

    /// Status of every job this instance knows about, including jobs whose
    /// entries were just reconciled away.
    pub fn status_all(&self) -> BTreeMap<JobName, JobStatus> {
        let view = self.registry.read_all();
        self.remember_view(&view);
        let known = self.known_set().clone();
        known
            .into_iter()
            .map(|name| {
                let status = compose_status(&name, &view);
                (name, status)
            })
            .collect()
    }

    /// Up to `max_lines` trailing lines of the job's output, oldest first.
    /// A job that never started has an empty log.
    pub fn logs(&self, name: &str, max_lines: usize) -> Result<Vec<String>> {
        validate_job_name(name)?;
        self.logs.tail(name, max_lines)
    }

    fn remember(&self, name: &str) {
        self.known_set().insert(name.to_string());
    }

    fn remember_view(&self, view: &RegistryView) {
        let mut known = self.known_set();
        known.extend(view.live.keys().cloned());
        known.extend(view.purged.iter().cloned());
        if !view.purged.is_empty() {
            debug!(jobs = ?view.purged, "jobs reconciled away");
        }
    }

    fn known_set(&self) -> std::sync::MutexGuard<'_, BTreeSet<JobName>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn compose_status(name: &str, view: &RegistryView) -> JobStatus {
    match view.live.get(name) {
        Some(record) => JobStatus::from_record(name, record, Utc::now()),
        None => JobStatus::not_running(name),
    }
}
