// tests/cli_run.rs
//
// Drives `jobwarden::run` the way `main` does, one subcommand per call, all
// sharing one state directory.
#![cfg(unix)]

mod common;
use crate::common::{init_tracing, wait_until, with_timeout};

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use clap::Parser;

use jobwarden::cli::CliArgs;
use jobwarden::run;
use jobwarden_test_utils::workers::supervisor_in;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(dir: &Path) -> std::io::Result<String> {
    let path = dir.join("Jobwarden.toml");
    std::fs::write(
        &path,
        r#"
[supervisor]
state_dir = "state"
grace_period = "2s"
poll_interval = "20ms"

[job.collector]
cmd = "sh"
args = ["-c", "echo \"got $PROCESS_CONFIG\"; trap 'exit 0' TERM; while true; do sleep 0.05; done"]

[job.collector.params]
keyword = "economy"
"#,
    )?;
    Ok(path.to_string_lossy().into_owned())
}

async fn jobwarden(config: &str, rest: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["jobwarden", "--config", config];
    argv.extend_from_slice(rest);
    run(CliArgs::try_parse_from(argv)?).await
}

#[tokio::test]
async fn start_status_logs_stop_through_cli() -> TestResult {
    with_timeout(async {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let config = write_config(dir.path())?;
        let state_dir = dir.path().join("state");

        jobwarden(&config, &["start", "collector", "-p", "count=10"]).await?;

        // State lands next to the config file, not in the cwd.
        let sup = supervisor_in(&state_dir);
        let status = sup.status("collector")?;
        assert!(status.running);
        let params = status.launch_parameters.expect("params recorded");
        assert_eq!(params["keyword"], serde_json::json!("economy"));
        assert_eq!(params["count"], serde_json::json!(10));

        assert!(wait_until(Duration::from_secs(2), || {
            sup.logs("collector", 1).map(|l| !l.is_empty()).unwrap_or(false)
        }));
        assert!(sup.logs("collector", 1)?[0].contains("\"keyword\":\"economy\""));

        jobwarden(&config, &["start", "collector"]).await?;
        jobwarden(&config, &["status"]).await?;
        jobwarden(&config, &["logs", "collector", "-n", "5"]).await?;
        jobwarden(&config, &["stop", "collector", "--grace", "1s"]).await?;

        assert!(!sup.status("collector")?.running);
        jobwarden(&config, &["stop-all"]).await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn unknown_job_is_rejected() -> TestResult {
    with_timeout(async {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let config = write_config(dir.path())?;

        let err = jobwarden(&config, &["start", "nope"])
            .await
            .expect_err("unknown job must fail");
        assert!(format!("{err:#}").contains("Unknown job: nope"));

        assert!(jobwarden(&config, &["logs", "nope"]).await.is_err());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn dry_run_touches_nothing() -> TestResult {
    with_timeout(async {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let config = write_config(dir.path())?;

        jobwarden(&config, &["--dry-run", "start", "collector"]).await?;
        assert!(!dir.path().join("state").exists());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn bad_param_fails_before_spawning() -> TestResult {
    with_timeout(async {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let config = write_config(dir.path())?;

        assert!(jobwarden(&config, &["start", "collector", "-p", "novalue"]).await.is_err());
        let sup = supervisor_in(&dir.path().join("state"));
        assert!(!sup.status("collector")?.running);
        Ok(())
    })
    .await
}
