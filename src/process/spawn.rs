// src/process/spawn.rs

//! Spawning detached worker processes.

use std::fs::File;
use std::io;
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::types::{JobCommand, LaunchParams};

/// Windows `CREATE_NEW_PROCESS_GROUP`.
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Spawn `command` as its own process group with stdout and stderr both
/// appended to `log`. The child owns `log` from here on.
///
/// `params` is exported as a JSON string under the `params_env` environment
/// variable; the worker decides what to do with it.
pub fn spawn_detached(
    name: &str,
    command: &JobCommand,
    params: &LaunchParams,
    params_env: &str,
    log: File,
) -> io::Result<Child> {
    let params_json = serde_json::to_string(params)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .env(params_env, params_json)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log));

    if let Some(ref cwd) = command.cwd {
        cmd.current_dir(cwd);
    }

    detach(&mut cmd);

    let child = cmd.spawn()?;
    info!(job = %name, pid = child.id(), cmd = %command, "spawned worker process");
    Ok(child)
}

/// Put the child in its own process group so signals aimed at the
/// supervisor's group do not reach it.
#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Wait on `child` from a background thread so that it is reaped as soon as
/// it exits, however it exits.
///
/// Without this, a worker killed out-of-band would linger as a zombie for as
/// long as this process holds its `Child`.
pub fn spawn_reaper(name: &str, mut child: Child) {
    let job = name.to_string();
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{job}"))
        .spawn(move || match child.wait() {
            Ok(status) => {
                debug!(job = %job, pid, exit_code = ?status.code(), success = status.success(), "worker process exited");
            }
            Err(e) => {
                warn!(job = %job, pid, error = %e, "failed waiting for worker process");
            }
        });

    if let Err(e) = spawned {
        // The child keeps running; it just will not be reaped by us.
        warn!(job = %name, pid, error = %e, "failed to start reaper thread");
    }
}
