// src/process/signal.rs

//! Platform-specific termination signalling.
//!
//! The supervisor's stop state machine only talks to [`ProcessControl`];
//! [`PlatformControl`] picks the POSIX or Windows mechanism at build time.

use std::fmt::Debug;
use std::io;

/// What happened when a signal was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    Delivered,
    /// The process was already gone.
    NoSuchProcess,
}

pub trait ProcessControl: Send + Sync + Debug {
    /// Ask the process to shut down. A request, not a guarantee.
    fn request_graceful_stop(&self, pid: u32) -> io::Result<SignalDelivery>;

    /// Terminate the process unconditionally.
    fn force_kill(&self, pid: u32) -> io::Result<SignalDelivery>;
}

/// Default [`ProcessControl`] for the host platform.
///
/// - POSIX: `SIGTERM` / `SIGKILL`, addressed to the worker's process group
///   (workers are spawned as group leaders), falling back to the single PID.
/// - Windows: `taskkill /T`, then `taskkill /T /F`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformControl;

#[cfg(unix)]
impl ProcessControl for PlatformControl {
    fn request_graceful_stop(&self, pid: u32) -> io::Result<SignalDelivery> {
        unix::send(pid, nix::sys::signal::Signal::SIGTERM)
    }

    fn force_kill(&self, pid: u32) -> io::Result<SignalDelivery> {
        unix::send(pid, nix::sys::signal::Signal::SIGKILL)
    }
}

#[cfg(unix)]
mod unix {
    use std::io;

    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;
    use tracing::debug;

    use super::SignalDelivery;

    pub(super) fn send(pid: u32, signal: Signal) -> io::Result<SignalDelivery> {
        let raw = match i32::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return Ok(SignalDelivery::NoSuchProcess),
        };
        let target = Pid::from_raw(raw);

        match killpg(target, signal) {
            Ok(()) => return Ok(SignalDelivery::Delivered),
            Err(Errno::ESRCH) => {
                debug!(pid, ?signal, "no process group; signalling pid directly");
            }
            Err(e) => return Err(io::Error::from(e)),
        }

        match kill(target, signal) {
            Ok(()) => Ok(SignalDelivery::Delivered),
            Err(Errno::ESRCH) => Ok(SignalDelivery::NoSuchProcess),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

#[cfg(windows)]
impl ProcessControl for PlatformControl {
    fn request_graceful_stop(&self, pid: u32) -> io::Result<SignalDelivery> {
        windows::taskkill(pid, false)
    }

    fn force_kill(&self, pid: u32) -> io::Result<SignalDelivery> {
        windows::taskkill(pid, true)
    }
}

#[cfg(windows)]
mod windows {
    use std::io;
    use std::process::{Command, Stdio};

    use super::SignalDelivery;

    // taskkill exits with 128 when the PID does not exist.
    const TASKKILL_NOT_FOUND: i32 = 128;

    pub(super) fn taskkill(pid: u32, force: bool) -> io::Result<SignalDelivery> {
        let pid_arg = pid.to_string();
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", pid_arg.as_str(), "/T"]);
        if force {
            cmd.arg("/F");
        }
        let status = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status()?;
        match status.code() {
            Some(0) => Ok(SignalDelivery::Delivered),
            Some(TASKKILL_NOT_FOUND) => Ok(SignalDelivery::NoSuchProcess),
            other => Err(io::Error::other(format!(
                "taskkill for pid {pid} exited with {other:?}"
            ))),
        }
    }
}
