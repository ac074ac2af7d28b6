// src/registry/lockfile.rs

//! Advisory lock on `<registry>.lock`, shared by every process that opens
//! the same registry.
//!
//! The in-memory `RwLock` only orders threads of one process; each CLI
//! invocation is its own process, so the read-modify-write cycle of the
//! table is also bracketed by this lock.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct DiskLock {
    file: File,
    path: PathBuf,
}

/// `registry.json` -> `registry.json.lock`.
pub fn lock_path_for(registry_path: &Path) -> PathBuf {
    let mut name = registry_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    registry_path.with_file_name(name)
}

impl DiskLock {
    /// Block until the lock next to `registry_path` is held in `mode`.
    pub fn acquire(registry_path: &Path, mode: LockMode) -> io::Result<Self> {
        let path = lock_path_for(registry_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match mode {
            LockMode::Shared => FileExt::lock_shared(&file)?,
            LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
        }
        Ok(Self { file, path })
    }
}

impl Drop for DiskLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well.
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = ?self.path, error = %e, "registry unlock failed");
        }
    }
}
