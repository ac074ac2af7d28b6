#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use jobwarden::types::JobCommand;
use jobwarden::{Supervisor, SupervisorOptions};

/// Options tuned for tests: short default grace and fast polling.
pub fn fast_options() -> SupervisorOptions {
    SupervisorOptions {
        default_grace: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        kill_confirm: Duration::from_secs(2),
        ..SupervisorOptions::default()
    }
}

/// Supervisor rooted at `state_dir` with [`fast_options`].
pub fn supervisor_in(state_dir: &Path) -> Supervisor {
    Supervisor::open(state_dir, fast_options())
}

/// Worker that runs until told to stop and exits promptly on SIGTERM.
pub fn cooperative_worker() -> JobCommand {
    JobCommand::shell("trap 'exit 0' TERM; while true; do sleep 0.05; done")
}

/// Worker that ignores SIGTERM and has to be killed.
pub fn stubborn_worker() -> JobCommand {
    JobCommand::shell("trap '' TERM; while true; do sleep 0.05; done")
}

/// Worker that prints `line-1` .. `line-<n>` and then idles.
pub fn chatty_worker(n: usize) -> JobCommand {
    JobCommand::shell(format!(
        "i=1; while [ $i -le {n} ]; do echo line-$i; i=$((i+1)); done; \
         trap 'exit 0' TERM; while true; do sleep 0.05; done"
    ))
}

/// Worker that echoes its launch parameters (from `$PROCESS_CONFIG`) once.
pub fn echo_params_worker() -> JobCommand {
    JobCommand::shell(
        "echo \"params=$PROCESS_CONFIG\"; trap 'exit 0' TERM; while true; do sleep 0.05; done",
    )
}
