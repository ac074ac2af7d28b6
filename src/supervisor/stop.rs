// src/supervisor/stop.rs

//! Stopping jobs.
//!
//! `stop` walks a fixed escalation ladder:
//!
//! 1. look up the live PID (none: `NotRunning`)
//! 2. request a graceful stop
//! 3. poll liveness for up to the grace period (exit: `Stopped`)
//! 4. kill unconditionally and poll briefly to confirm (`ForceKilled`)
//! 5. close the log handle and remove the registry entry
//!
//! Step 5 is owned by a [`StopCleanup`] guard, so it also runs if anything
//! in steps 2-4 fails or panics.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::Supervisor;
use crate::errors::Result;
use crate::process::SignalDelivery;
use crate::types::{JobName, StopAllReport, StopOutcome, validate_job_name};

impl Supervisor {
    /// Stop `name`, giving it `grace` to exit after the graceful request.
    ///
    /// Idempotent: stopping a job that is not running reports `NotRunning`.
    /// Worst-case latency is `grace` plus `kill_confirm`.
    pub fn stop(&self, name: &str, grace: Duration) -> Result<StopOutcome> {
        validate_job_name(name)?;

        let name_lock = self.stop_lock(name);
        let _serial = name_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(record) = self.registry.get(name) else {
            // The worker may have died on its own while we still hold its log.
            self.logs.close(name);
            debug!(job = %name, "stop requested but job is not running");
            return Ok(StopOutcome::NotRunning);
        };

        let pid = record.process_id;
        info!(job = %name, pid, grace_ms = grace.as_millis() as u64, "stopping job");

        let cleanup = StopCleanup {
            supervisor: self,
            name,
            pid,
            done: false,
        };
        let outcome = self.terminate(name, pid, grace);
        cleanup.finish()?;

        let outcome = outcome?;
        info!(job = %name, pid, outcome = %outcome, "job stop finished");
        Ok(outcome)
    }

    /// [`Supervisor::stop`] with the configured default grace period.
    pub fn stop_default(&self, name: &str) -> Result<StopOutcome> {
        self.stop(name, self.options.default_grace)
    }

    /// Stop every job currently in the registry, concurrently.
    ///
    /// A failure for one job is recorded in the report and does not prevent
    /// the others from being stopped.
    pub fn stop_all(&self) -> StopAllReport {
        let names: Vec<JobName> = self.registry.read_all().live.into_keys().collect();
        let grace = self.options.default_grace;
        let mut report = StopAllReport::default();

        if names.is_empty() {
            debug!("stop_all: nothing running");
            return report;
        }
        info!(jobs = ?names, "stopping all jobs");

        thread::scope(|scope| {
            let handles: Vec<_> = names
                .iter()
                .map(|name| (name, scope.spawn(move || self.stop(name, grace))))
                .collect();

            for (name, handle) in handles {
                match handle.join() {
                    Ok(Ok(outcome)) => {
                        report.outcomes.insert(name.clone(), outcome);
                    }
                    Ok(Err(e)) => {
                        warn!(job = %name, error = %e, "failed to stop job");
                        report.failures.insert(name.clone(), e.to_string());
                    }
                    Err(_) => {
                        error!(job = %name, "stop panicked");
                        report
                            .failures
                            .insert(name.clone(), "stop panicked".to_string());
                    }
                }
            }
        });

        report
    }

    fn terminate(&self, name: &str, pid: u32, grace: Duration) -> io::Result<StopOutcome> {
        match self.control.request_graceful_stop(pid) {
            Ok(SignalDelivery::Delivered) => {
                if self.wait_for_exit(pid, grace) {
                    return Ok(StopOutcome::Stopped);
                }
                warn!(job = %name, pid, "grace period elapsed; killing job");
            }
            Ok(SignalDelivery::NoSuchProcess) => {
                debug!(job = %name, pid, "process vanished before graceful stop");
                return Ok(StopOutcome::NotRunning);
            }
            Err(e) => {
                warn!(job = %name, pid, error = %e, "graceful stop request failed; killing job");
            }
        }

        match self.control.force_kill(pid)? {
            SignalDelivery::Delivered => {}
            SignalDelivery::NoSuchProcess => {
                // Exited right at the end of the grace period.
                return Ok(StopOutcome::Stopped);
            }
        }

        if !self.wait_for_exit(pid, self.options.kill_confirm) {
            error!(job = %name, pid, "process still alive after kill");
            return Err(io::Error::other(format!(
                "process {pid} still alive after kill"
            )));
        }
        Ok(StopOutcome::ForceKilled)
    }

    /// Poll until `pid` is gone or `window` elapses. Returns whether it exited.
    ///
    /// A window too large to represent as an `Instant` never elapses.
    fn wait_for_exit(&self, pid: u32, window: Duration) -> bool {
        let liveness = self.registry.liveness();
        let deadline = Instant::now().checked_add(window);
        let poll = self.options.poll_interval.max(Duration::from_millis(1));
        loop {
            if !liveness.probe(Some(pid)) {
                return true;
            }
            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };
            thread::sleep(nap);
        }
    }

    fn stop_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .stop_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

/// Releases the log handle and the registry entry of a stopped job.
struct StopCleanup<'a> {
    supervisor: &'a Supervisor,
    name: &'a str,
    pid: u32,
    done: bool,
}

impl StopCleanup<'_> {
    fn finish(mut self) -> Result<()> {
        self.done = true;
        self.release()
    }

    fn release(&self) -> Result<()> {
        self.supervisor.logs.close(self.name);
        // Only drop the entry if it is still ours; a new start may have
        // replaced it once the process was gone.
        self.supervisor
            .registry
            .remove_if_pid(self.name, self.pid)
            .map(|_| ())
    }
}

impl Drop for StopCleanup<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(e) = self.release() {
            warn!(job = %self.name, pid = self.pid, error = %e, "cleanup after failed stop incomplete");
        }
    }
}
