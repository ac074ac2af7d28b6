// src/process/mod.rs

//! OS process plumbing.
//!
//! - [`liveness`] answers whether a PID is still alive.
//! - [`signal`] delivers graceful and forced termination requests.
//! - [`spawn`] starts detached workers and reaps them.

pub mod liveness;
pub mod signal;
pub mod spawn;

pub use liveness::{Liveness, SystemLiveness};
pub use signal::{PlatformControl, ProcessControl, SignalDelivery};
pub use spawn::{spawn_detached, spawn_reaper};
