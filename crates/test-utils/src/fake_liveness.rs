use std::collections::HashSet;
use std::sync::Mutex;

use jobwarden::process::Liveness;

/// A process table the test controls.
///
/// PIDs are alive only after `set_alive(pid, true)`.
#[derive(Debug, Default)]
pub struct FakeLiveness {
    alive: Mutex<HashSet<u32>>,
}

impl FakeLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alive(&self, pid: u32, alive: bool) {
        let mut set = self.alive.lock().unwrap();
        if alive {
            set.insert(pid);
        } else {
            set.remove(&pid);
        }
    }
}

impl Liveness for FakeLiveness {
    fn probe(&self, pid: Option<u32>) -> bool {
        pid.is_some_and(|pid| self.alive.lock().unwrap().contains(&pid))
    }
}
