// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile, SupervisorSection, SupervisorSettings};
use crate::errors::{Result, SupervisorError};
use crate::types::{parse_duration, validate_job_name};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        let supervisor = settings_from_section(&raw.supervisor)?;
        Ok(ConfigFile::new_unchecked(supervisor, raw.job))
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_jobs(cfg)?;
    validate_jobs(cfg)?;
    settings_from_section(&cfg.supervisor)?;
    Ok(())
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(SupervisorError::ConfigError(
            "config must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        validate_job_name(name).map_err(|e| {
            SupervisorError::ConfigError(format!(
                "{e}: job names must be 1-64 characters of [A-Za-z0-9_.-], start with a letter or digit, \
                 and become the log file name '<name>.log'"
            ))
        })?;
        if job.cmd.trim().is_empty() {
            return Err(SupervisorError::ConfigError(format!(
                "job '{}' has an empty `cmd`",
                name
            )));
        }
    }
    Ok(())
}

fn settings_from_section(section: &SupervisorSection) -> Result<SupervisorSettings> {
    let grace_period = duration_field("grace_period", &section.grace_period)?;
    let poll_interval = duration_field("poll_interval", &section.poll_interval)?;
    let kill_confirm = duration_field("kill_confirm", &section.kill_confirm)?;

    if poll_interval.is_zero() {
        return Err(SupervisorError::ConfigError(
            "[supervisor].poll_interval must be > 0".to_string(),
        ));
    }
    if section.params_env.trim().is_empty() || section.params_env.contains('=') {
        return Err(SupervisorError::ConfigError(format!(
            "[supervisor].params_env is not a valid variable name: {:?}",
            section.params_env
        )));
    }

    Ok(SupervisorSettings {
        state_dir: section.state_dir.clone(),
        grace_period,
        poll_interval,
        kill_confirm,
        params_env: section.params_env.clone(),
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| {
        SupervisorError::ConfigError(format!("[supervisor].{field}: {e}"))
    })
}
