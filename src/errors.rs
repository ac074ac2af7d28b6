// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Expected supervision outcomes ("already running", "not running",
//! "force-killed", "spawn failed") are *not* errors; they are variants of
//! [`crate::types::StartOutcome`] and [`crate::types::StopOutcome`]. The
//! variants below are reserved for infrastructure failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Invalid job name: {0:?}")]
    InvalidJobName(String),

    #[error("Failed to persist registry to {path:?}: {source}")]
    RegistryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock registry via {path:?}: {source}")]
    RegistryLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;
