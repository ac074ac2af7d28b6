// tests/config_loading.rs

mod common;
use crate::common::{demo_path, init_tracing};

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use jobwarden::config::{ConfigFile, RawConfigFile, load_and_validate, load_from_path};
use jobwarden::errors::SupervisorError;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    let file = write_config(contents);
    match load_and_validate(file.path()) {
        Err(SupervisorError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn demo_config_loads_with_params_and_env() -> TestResult {
    init_tracing();

    let cfg = load_and_validate(demo_path("Jobwarden.toml"))?;

    assert_eq!(
        cfg.job_names().collect::<Vec<_>>(),
        vec!["cleaner", "collector", "uploader"]
    );
    assert_eq!(cfg.supervisor.state_dir, PathBuf::from(".jobwarden"));
    assert_eq!(cfg.supervisor.grace_period, Duration::from_secs(5));
    assert_eq!(cfg.supervisor.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.supervisor.params_env, "PROCESS_CONFIG");

    let collector = &cfg.job["collector"];
    assert_eq!(collector.params["keyword"], serde_json::json!("economy"));
    assert_eq!(collector.params["count"], serde_json::json!(10));

    let uploader = cfg.job["uploader"].command();
    assert_eq!(uploader.program, "sh");
    assert_eq!(uploader.env["UPLOAD_TARGET"], "s3://bucket/news");

    let options = cfg.supervisor.options();
    assert_eq!(options.default_grace, Duration::from_secs(5));
    assert_eq!(options.kill_confirm, Duration::from_secs(5));
    Ok(())
}

#[test]
fn supervisor_section_defaults_apply() -> TestResult {
    let file = write_config(
        r#"
[job.worker]
cmd = "sleep"
args = ["60"]
"#,
    );

    let raw: RawConfigFile = load_from_path(file.path())?;
    assert_eq!(raw.supervisor.grace_period, "10s");

    let cfg = ConfigFile::try_from(raw)?;
    assert_eq!(cfg.supervisor.state_dir, PathBuf::from(".jobwarden"));
    assert_eq!(cfg.supervisor.grace_period, Duration::from_secs(10));
    assert_eq!(cfg.supervisor.kill_confirm, Duration::from_secs(5));
    assert_eq!(cfg.supervisor.params_env, "PROCESS_CONFIG");
    assert!(cfg.job["worker"].params.is_empty());
    Ok(())
}

#[test]
fn config_without_jobs_is_rejected() {
    let msg = expect_config_error(
        r#"
[supervisor]
grace_period = "3s"
"#,
    );
    assert!(msg.contains("at least one"));
}

#[test]
fn job_name_that_escapes_log_dir_is_rejected() {
    let msg = expect_config_error(
        r#"
[job."../etc"]
cmd = "true"
"#,
    );
    assert!(msg.contains("Invalid job name: \"../etc\""), "{msg}");
    assert!(msg.contains("1-64 characters"));
}

#[test]
fn job_name_longer_than_64_characters_is_rejected() {
    let long = "a".repeat(65);
    let msg = expect_config_error(&format!("[job.{long}]\ncmd = \"true\"\n"));
    assert!(msg.contains(&long));
    assert!(msg.contains("'<name>.log'"));

    let ok = "a".repeat(64);
    let file = write_config(&format!("[job.{ok}]\ncmd = \"true\"\n"));
    assert!(load_and_validate(file.path()).is_ok());
}

#[test]
fn empty_cmd_is_rejected() {
    let msg = expect_config_error(
        r#"
[job.collector]
cmd = "   "
"#,
    );
    assert!(msg.contains("collector"));
    assert!(msg.contains("empty `cmd`"));
}

#[test]
fn bad_durations_name_the_field() {
    let msg = expect_config_error(
        r#"
[supervisor]
grace_period = "ten seconds"

[job.collector]
cmd = "true"
"#,
    );
    assert!(msg.contains("grace_period"));

    let msg = expect_config_error(
        r#"
[supervisor]
poll_interval = "0ms"

[job.collector]
cmd = "true"
"#,
    );
    assert!(msg.contains("poll_interval"));
}

#[test]
fn invalid_params_env_is_rejected() {
    let msg = expect_config_error(
        r#"
[supervisor]
params_env = "A=B"

[job.collector]
cmd = "true"
"#,
    );
    assert!(msg.contains("params_env"));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[job.collector\ncmd = ");
    match load_and_validate(file.path()) {
        Err(SupervisorError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {:?}", other),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    match load_and_validate("/nonexistent/jobwarden/Jobwarden.toml") {
        Err(SupervisorError::IoError(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::NotFound)
        }
        other => panic!("Expected IoError, got: {:?}", other),
    }
}
