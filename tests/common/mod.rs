#![allow(dead_code)]

use std::path::PathBuf;

pub use jobwarden_test_utils::{init_tracing, wait_until, with_timeout};

/// Path of a file under `demos/`.
pub fn demo_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(file)
}
