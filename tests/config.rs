//! Configuration Integration Tests
//!
//! A YAML config file all the way to a finished run.

use std::io::Write;

use daybreak::config::{load_config, Runtime, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use daybreak::core::AdapterKind;
use daybreak::domain::{OverallStatus, StepStatus};
use tempfile::TempDir;

fn write_config(temp: &TempDir, yaml: &str) -> std::path::PathBuf {
    let dir = temp.path().join(CONFIG_DIR_NAME);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(CONFIG_FILE_NAME);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    path
}

#[tokio::test]
async fn test_yaml_config_drives_a_run() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        r#"
schedule:
  at: "06:30"
  timezone: Europe/Berlin
defaults:
  step_timeout_seconds: 10
  grace_period_ms: 50
adapters:
  news_fetch:
    type: echo
    message: "Headlines about {input}"
  summarize:
    type: command
    program: cat
notify:
  console: false
"#,
    );

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
    assert_eq!(config.schedule.to_string(), "daily at 06:30 Europe/Berlin");
    assert!(config.notify.build().is_empty());

    let runtime = Runtime::build(config).unwrap();
    assert_eq!(runtime.orchestrator.adapters().kinds(), AdapterKind::ALL.to_vec());

    let run = runtime.orchestrator.execute(&runtime.registry).await;
    assert_eq!(run.overall_status, OverallStatus::AllSucceeded);

    // `cat` hands back what the news step produced
    let summary = run.result("summarize").unwrap();
    assert_eq!(summary.status, StepStatus::Success);
    assert!(summary
        .output
        .as_ref()
        .unwrap()
        .text
        .contains("Headlines about stock market, politics"));
}

#[test]
fn test_invalid_schedule_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        r#"
schedule:
  at: "25:00"
"#,
    );

    let err = load_config(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Hour must be 0-23"));
}

#[test]
fn test_unknown_adapter_kind_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        r#"
steps:
  - name: coffee
    adapter: espresso_machine
"#,
    );

    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope.yaml");

    let err = load_config(Some(&missing)).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
}
