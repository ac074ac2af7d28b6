// src/process/liveness.rs

//! "Is this process still alive on this host?"
//!
//! [`SystemLiveness`] performs a zero-effect probe against the OS process
//! table (signal 0 on POSIX). Absence is a normal `false`, never an error.
//! The [`Liveness`] trait exists so registry tests can substitute a fake
//! process table.

use std::fmt::Debug;

use crate::types::JobRecord;

pub trait Liveness: Send + Sync + Debug {
    /// Zero-effect existence check. `None` is never alive.
    fn probe(&self, pid: Option<u32>) -> bool;

    /// OS-level start marker for `pid`, if the platform exposes one.
    ///
    /// Two processes that share a PID (after reuse) have different tokens.
    fn start_token(&self, _pid: u32) -> Option<u64> {
        None
    }

    /// A record is alive when its PID is alive and, if both sides know a
    /// start token, the tokens agree.
    fn is_record_alive(&self, record: &JobRecord) -> bool {
        if !self.probe(Some(record.process_id)) {
            return false;
        }
        match (record.start_token, self.start_token(record.process_id)) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }
}

/// Liveness checker backed by the real OS process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLiveness;

impl Liveness for SystemLiveness {
    fn probe(&self, pid: Option<u32>) -> bool {
        match pid {
            Some(pid) => pid_exists(pid),
            None => false,
        }
    }

    fn start_token(&self, pid: u32) -> Option<u64> {
        read_start_token(pid)
    }
}

#[cfg(unix)]
fn pid_exists(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // PID 0 and negative values address process groups, not a process.
    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => !is_zombie(pid),
        // Exists, but owned by someone else.
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(windows)]
fn pid_exists(pid: u32) -> bool {
    use std::process::Command;

    if pid == 0 {
        return false;
    }
    let filter = format!("PID eq {pid}");
    match Command::new("tasklist")
        .args(["/FI", filter.as_str(), "/NH", "/FO", "CSV"])
        .output()
    {
        Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\"")),
        Err(e) => {
            tracing::warn!(pid, error = %e, "tasklist probe failed; treating process as dead");
            false
        }
    }
}

/// Fields of `/proc/<pid>/stat` after the `(comm)` field: state, then
/// ppid, pgrp, ... with `starttime` being overall field 22.
#[cfg(target_os = "linux")]
fn proc_stat_fields(pid: u32) -> Option<Vec<String>> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // `comm` may itself contain spaces and parentheses.
    let rest = &stat[stat.rfind(')')? + 1..];
    Some(rest.split_whitespace().map(str::to_string).collect())
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    proc_stat_fields(pid)
        .and_then(|fields| fields.first().cloned())
        .is_some_and(|state| state == "Z" || state == "X")
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn read_start_token(pid: u32) -> Option<u64> {
    // starttime is field 22; the slice starts at field 3.
    proc_stat_fields(pid)?.get(22 - 3)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn read_start_token(_pid: u32) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_pid_is_never_alive() {
        assert!(!SystemLiveness.probe(None));
        assert!(!SystemLiveness.probe(Some(0)));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(SystemLiveness.probe(Some(std::process::id())));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn current_process_has_stable_start_token() {
        let pid = std::process::id();
        let first = SystemLiveness.start_token(pid);
        assert!(first.is_some());
        assert_eq!(first, SystemLiveness.start_token(pid));
    }
}
