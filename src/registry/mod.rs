// src/registry/mod.rs

//! Durable job table: job name -> {pid, start time, launch parameters}.
//!
//! - All mutations (`reserve` + `commit`, `remove`) run under the write half
//!   of one `RwLock` owned by the [`Registry`] instance.
//! - Plain reads share the read half, so they can run concurrently with each
//!   other but never observe a write in progress.
//! - Every read re-validates liveness; dead entries are dropped from the
//!   returned view and purged from disk as a side effect.
//! - Across processes the same scopes hold an advisory lock on
//!   `registry.json.lock` ([`lockfile`]): shared for reads, exclusive for
//!   writes.
//!
//! The on-disk format and atomic replace live in [`store`].

pub mod lockfile;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};
use crate::process::{Liveness, SystemLiveness};
use crate::types::{JobName, JobRecord};

pub use lockfile::{DiskLock, LockMode};
pub use store::{REGISTRY_FILE_NAME, RegistryTable};

/// Liveness-validated view of the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryView {
    /// Entries whose process is alive.
    pub live: RegistryTable,
    /// Names whose entries were found dead during this read and purged.
    pub purged: Vec<JobName>,
}

/// Outcome of [`Registry::reserve`].
#[derive(Debug)]
pub enum Reserve<'a> {
    /// No live entry exists; the write lock is held until the reservation
    /// is committed, aborted or dropped.
    Reserved(Reservation<'a>),
    /// A live entry already exists for this name.
    AlreadyActive(JobRecord),
}

#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    lock: RwLock<()>,
    liveness: Arc<dyn Liveness>,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>, liveness: Arc<dyn Liveness>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
            liveness,
        }
    }

    /// Registry at `<state_dir>/registry.json` using the OS liveness probe.
    pub fn in_state_dir(state_dir: impl AsRef<Path>) -> Self {
        Self::new(
            state_dir.as_ref().join(REGISTRY_FILE_NAME),
            Arc::new(SystemLiveness),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn liveness(&self) -> &Arc<dyn Liveness> {
        &self.liveness
    }

    /// Begin a start for `name`.
    ///
    /// Loads the full table and checks the existing entry, if any. A live
    /// entry aborts with [`Reserve::AlreadyActive`]; a dead one is discarded.
    /// Fails only if the cross-process lock cannot be taken.
    pub fn reserve(&self, name: &str) -> Result<Reserve<'_>> {
        let guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let disk = self.disk_lock(LockMode::Exclusive)?;
        let mut table = store::load(&self.path);

        let mut stale = None;
        if let Some(existing) = table.get(name) {
            if self.liveness.is_record_alive(existing) {
                debug!(job = %name, pid = existing.process_id, "reservation refused; job is alive");
                return Ok(Reserve::AlreadyActive(existing.clone()));
            }
            stale = table.remove(name);
            debug!(job = %name, "discarding dead entry during reservation");
        }

        Ok(Reserve::Reserved(Reservation {
            registry: self,
            name: name.to_string(),
            table,
            stale,
            _disk: disk,
            _guard: guard,
        }))
    }

    /// Delete the entry for `name`. Removing an absent name is a no-op.
    pub fn remove(&self, name: &str) -> Result<bool> {
        self.remove_where(name, |_| true)
    }

    /// Delete the entry for `name` only if it still refers to `pid`.
    pub fn remove_if_pid(&self, name: &str, pid: u32) -> Result<bool> {
        self.remove_where(name, |record| record.process_id == pid)
    }

    fn remove_where(&self, name: &str, matches: impl Fn(&JobRecord) -> bool) -> Result<bool> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let _disk = self.disk_lock(LockMode::Exclusive)?;
        let mut table = store::load(&self.path);

        match table.get(name) {
            Some(record) if matches(record) => {
                table.remove(name);
                store::save(&self.path, &table)?;
                debug!(job = %name, "registry entry removed");
                Ok(true)
            }
            Some(_) => {
                debug!(job = %name, "registry entry belongs to a newer run; left in place");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Liveness-validated snapshot of every entry.
    ///
    /// Dead entries are purged from disk. A failure to persist that purge is
    /// logged; the returned view is still accurate.
    pub fn read_all(&self) -> RegistryView {
        {
            let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
            let _disk = self.disk_lock_or_warn(LockMode::Shared);
            let table = store::load(&self.path);
            let (live, dead) = self.partition(table);
            if dead.is_empty() {
                return RegistryView {
                    live,
                    purged: Vec::new(),
                };
            }
        }

        // Stale entries seen: redo the read under the write lock, since the
        // table may have changed in between.
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let disk = self.disk_lock_or_warn(LockMode::Exclusive);
        let table = store::load(&self.path);
        let (live, purged) = self.partition(table);

        if !purged.is_empty() {
            if disk.is_none() {
                // Rewriting without the lock could drop another process's
                // concurrent commit.
                warn!(jobs = ?purged, "registry lock unavailable; purge not persisted");
            } else {
                info!(jobs = ?purged, "reconciling registry: purging dead entries");
                if let Err(e) = store::save(&self.path, &live) {
                    warn!(error = %e, "failed to persist registry reconciliation");
                }
            }
        }

        RegistryView { live, purged }
    }

    /// Liveness-validated lookup of a single entry.
    pub fn get(&self, name: &str) -> Option<JobRecord> {
        self.read_all().live.remove(name)
    }

    fn disk_lock(&self, mode: LockMode) -> Result<DiskLock> {
        DiskLock::acquire(&self.path, mode).map_err(|source| SupervisorError::RegistryLock {
            path: lockfile::lock_path_for(&self.path),
            source,
        })
    }

    /// Reads stay available without the cross-process lock: the snapshot is
    /// replaced atomically, so an unlocked read is still a complete table.
    fn disk_lock_or_warn(&self, mode: LockMode) -> Option<DiskLock> {
        match self.disk_lock(mode) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "reading registry without cross-process lock");
                None
            }
        }
    }

    fn partition(&self, table: RegistryTable) -> (RegistryTable, Vec<JobName>) {
        let mut live = RegistryTable::new();
        let mut dead = Vec::new();
        for (name, record) in table {
            if self.liveness.is_record_alive(&record) {
                live.insert(name, record);
            } else {
                dead.push(name);
            }
        }
        (live, dead)
    }
}

/// A held reservation for one job name.
///
/// Holds the registry's write lock and the exclusive disk lock, so no other
/// start, stop cleanup or read, in this process or another, can interleave
/// until it is resolved.
#[derive(Debug)]
pub struct Reservation<'a> {
    registry: &'a Registry,
    name: JobName,
    table: RegistryTable,
    stale: Option<JobRecord>,
    _disk: DiskLock,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl Reservation<'_> {
    /// Persist `record` as the entry for the reserved name.
    pub fn commit(mut self, record: JobRecord) -> Result<()> {
        let pid = record.process_id;
        self.table.insert(self.name.clone(), record);
        store::save(&self.registry.path, &self.table)?;
        debug!(job = %self.name, pid, "registry entry committed");
        Ok(())
    }

    /// Give up the reservation, persisting the removal of any dead entry
    /// found while reserving.
    pub fn abort(self) -> Result<()> {
        if self.stale.is_some() {
            store::save(&self.registry.path, &self.table)?;
        }
        debug!(job = %self.name, "reservation aborted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::types::LaunchParams;

    /// Process table under test control.
    #[derive(Debug, Default)]
    struct TableLiveness {
        alive: Mutex<HashSet<u32>>,
    }

    impl TableLiveness {
        fn set_alive(&self, pid: u32, alive: bool) {
            let mut set = self.alive.lock().unwrap();
            if alive {
                set.insert(pid);
            } else {
                set.remove(&pid);
            }
        }
    }

    impl Liveness for TableLiveness {
        fn probe(&self, pid: Option<u32>) -> bool {
            pid.is_some_and(|pid| self.alive.lock().unwrap().contains(&pid))
        }
    }

    fn record(pid: u32) -> JobRecord {
        JobRecord {
            process_id: pid,
            start_time: Utc::now(),
            start_token: None,
            launch_parameters: LaunchParams::new(),
            command: None,
        }
    }

    fn registry() -> (tempfile::TempDir, Arc<TableLiveness>, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let liveness = Arc::new(TableLiveness::default());
        let registry = Registry::new(dir.path().join(REGISTRY_FILE_NAME), liveness.clone());
        (dir, liveness, registry)
    }

    fn commit(registry: &Registry, name: &str, pid: u32) {
        match registry.reserve(name).unwrap() {
            Reserve::Reserved(r) => r.commit(record(pid)).unwrap(),
            Reserve::AlreadyActive(_) => panic!("{name} unexpectedly active"),
        }
    }

    #[test]
    fn reserve_refuses_live_entry() {
        let (_dir, liveness, registry) = registry();
        liveness.set_alive(10, true);
        commit(&registry, "collector", 10);

        match registry.reserve("collector").unwrap() {
            Reserve::AlreadyActive(existing) => assert_eq!(existing.process_id, 10),
            Reserve::Reserved(_) => panic!("expected AlreadyActive"),
        }
    }

    #[test]
    fn reserve_replaces_dead_entry() {
        let (_dir, liveness, registry) = registry();
        commit(&registry, "collector", 10);
        liveness.set_alive(11, true);
        commit(&registry, "collector", 11);

        assert_eq!(registry.get("collector").map(|r| r.process_id), Some(11));
    }

    #[test]
    fn aborted_reservation_purges_dead_entry_and_writes_nothing_new() {
        let (_dir, _liveness, registry) = registry();
        commit(&registry, "collector", 10);

        match registry.reserve("collector").unwrap() {
            Reserve::Reserved(r) => r.abort().unwrap(),
            Reserve::AlreadyActive(_) => panic!("dead entry must not block"),
        }
        assert!(store::load(registry.path()).is_empty());
    }

    #[test]
    fn read_all_purges_dead_entries_from_disk() {
        let (_dir, liveness, registry) = registry();
        liveness.set_alive(1, true);
        liveness.set_alive(2, true);
        commit(&registry, "collector", 1);
        commit(&registry, "uploader", 2);

        liveness.set_alive(2, false);
        let view = registry.read_all();
        assert_eq!(view.live.keys().collect::<Vec<_>>(), vec!["collector"]);
        assert_eq!(view.purged, vec!["uploader".to_string()]);

        let on_disk = store::load(registry.path());
        assert!(!on_disk.contains_key("uploader"));

        // Second read has nothing left to purge.
        assert!(registry.read_all().purged.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let (_dir, liveness, registry) = registry();
        liveness.set_alive(5, true);
        commit(&registry, "cleaner", 5);

        assert!(registry.remove("cleaner").unwrap());
        assert!(!registry.remove("cleaner").unwrap());
        assert!(!registry.remove("never-existed").unwrap());
    }

    #[test]
    fn remove_if_pid_leaves_newer_run_alone() {
        let (_dir, liveness, registry) = registry();
        liveness.set_alive(7, true);
        commit(&registry, "collector", 7);

        assert!(!registry.remove_if_pid("collector", 6).unwrap());
        assert!(registry.get("collector").is_some());
        assert!(registry.remove_if_pid("collector", 7).unwrap());
        assert!(registry.get("collector").is_none());
    }

    #[test]
    fn corrupt_snapshot_is_treated_as_empty() {
        let (_dir, liveness, registry) = registry();
        std::fs::write(registry.path(), b"\x00garbage").unwrap();
        assert!(registry.read_all().live.is_empty());

        liveness.set_alive(3, true);
        commit(&registry, "collector", 3);
        assert_eq!(registry.get("collector").map(|r| r.process_id), Some(3));
    }
}
