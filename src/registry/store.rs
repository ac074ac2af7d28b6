// src/registry/store.rs

//! On-disk snapshot format and atomic persistence.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{Result, SupervisorError};
use crate::types::{JobName, JobRecord};

/// File name of the registry inside the state directory.
pub const REGISTRY_FILE_NAME: &str = "registry.json";

const SNAPSHOT_VERSION: u32 = 1;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

pub type RegistryTable = BTreeMap<JobName, JobRecord>;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    jobs: RegistryTable,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Load the full table.
///
/// A missing file is an empty table. So is an unreadable or unparsable one:
/// losing bookkeeping is preferable to refusing to operate.
pub fn load(path: &Path) -> RegistryTable {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return RegistryTable::new(),
        Err(e) => {
            warn!(path = ?path, error = %e, "registry unreadable; treating as empty");
            return RegistryTable::new();
        }
    };

    if contents.trim().is_empty() {
        return RegistryTable::new();
    }

    match serde_json::from_str::<Snapshot>(&contents) {
        Ok(snapshot) => {
            if snapshot.version != SNAPSHOT_VERSION {
                warn!(path = ?path, version = snapshot.version, "unexpected registry version; reading anyway");
            }
            snapshot.jobs
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "registry corrupt; treating as empty");
            RegistryTable::new()
        }
    }
}

/// Write the full table with write-to-sibling-then-rename, so readers only
/// ever observe a complete snapshot.
pub fn save(path: &Path, table: &RegistryTable) -> Result<()> {
    write_atomic(path, table).map_err(|source| SupervisorError::RegistryWrite {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(path: &Path, table: &RegistryTable) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        jobs: table.clone(),
    };

    let tmp_path = temp_path_for(path);
    let result = (|| -> io::Result<()> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writer.write_all(b"\n")?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
        return result;
    }

    sync_dir(parent);
    debug!(path = ?path, jobs = table.len(), "registry persisted");
    Ok(())
}

/// Sibling temp file, unique per process and per write.
fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| REGISTRY_FILE_NAME.to_string());
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()))
}

#[cfg(unix)]
fn sync_dir(dir: Option<&Path>) {
    if let Some(dir) = dir {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!(dir = ?dir, error = %e, "directory fsync failed");
        }
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: Option<&Path>) {}
