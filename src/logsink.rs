// src/logsink.rs

//! Per-job output capture.
//!
//! Each job owns one append-only file `<dir>/<name>.log`. The handle opened
//! at spawn time is kept here until the job is stopped, so that the
//! supervisor can guarantee its release.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::errors::Result;

/// Only the trailing window of a log file is scanned by [`LogSink::tail`].
pub const MAX_TAIL_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug)]
pub struct LogSink {
    dir: PathBuf,
    handles: Mutex<HashMap<String, File>>,
}

impl LogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.log"))
    }

    /// Open (or create) the job's log file in append mode, creating the log
    /// directory on demand.
    ///
    /// The sink keeps the handle; the caller gets a clone to wire into the
    /// child process. Any handle still held from a previous run is closed.
    pub fn open(&self, name: &str) -> Result<File> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let for_child = file.try_clone()?;

        let previous = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), file);
        if previous.is_some() {
            debug!(job = %name, "replaced stale log handle");
        }

        debug!(job = %name, path = ?path, "opened log file");
        Ok(for_child)
    }

    /// Release the job's handle. Idempotent; returns whether one was held.
    pub fn close(&self, name: &str) -> bool {
        let removed = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(file) => {
                if let Err(e) = file.sync_all() {
                    debug!(job = %name, error = %e, "sync on close failed");
                }
                debug!(job = %name, "closed log file");
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Last `max_lines` lines of the job's log, oldest first.
    ///
    /// A missing file yields an empty vector. Invalid UTF-8 is replaced
    /// rather than rejected.
    pub fn tail(&self, name: &str, max_lines: usize) -> Result<Vec<String>> {
        if max_lines == 0 {
            return Ok(Vec::new());
        }
        let path = self.path_for(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(tail_lines(file, max_lines)?)
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        let handles = self.handles.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !handles.is_empty() {
            debug!(count = handles.len(), "releasing log handles of jobs still running");
        }
        handles.clear();
    }
}

fn tail_lines(mut file: File, max_lines: usize) -> io::Result<Vec<String>> {
    let len = file.metadata()?.len();
    let skip_partial = len > MAX_TAIL_BYTES;
    if skip_partial {
        file.seek(SeekFrom::Start(len - MAX_TAIL_BYTES))?;
    }

    let mut reader = BufReader::new(file.take(MAX_TAIL_BYTES));
    let mut buf = Vec::new();
    if skip_partial {
        // We probably landed mid-line.
        reader.read_until(b'\n', &mut buf)?;
    }

    let mut window: VecDeque<String> = VecDeque::with_capacity(max_lines.min(1024));
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if window.len() == max_lines {
            window.pop_front();
        }
        window.push_back(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(window.into())
}
