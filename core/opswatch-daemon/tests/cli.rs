use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn opswatch(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opswatch"))
        .args(args)
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("OPSWATCH_DEBUG_LOG")
        .output()
        .expect("run opswatch")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "opswatch failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn status_starts_at_epoch() {
    let home = tempfile::tempdir().expect("temp dir");
    let status = stdout_json(&opswatch(home.path(), &["status"]));
    assert_eq!(status["profile"], "default");
    assert_eq!(status["readCursor"], "1970-01-01T00:00:00Z");
}

#[test]
fn mark_read_is_visible_to_later_invocations() {
    let home = tempfile::tempdir().expect("temp dir");

    let marked = stdout_json(&opswatch(home.path(), &["mark-read", "--profile", "noc"]));
    let status = stdout_json(&opswatch(home.path(), &["status", "--profile", "noc"]));
    assert_eq!(status["readCursor"], marked["readCursor"]);
    assert_ne!(status["readCursor"], "1970-01-01T00:00:00Z");
    assert!(home.path().join(".opswatch").join("state.json").exists());

    let other = stdout_json(&opswatch(home.path(), &["status"]));
    assert_eq!(other["readCursor"], "1970-01-01T00:00:00Z");
}

#[test]
fn malformed_config_exits_with_error() {
    let home = tempfile::tempdir().expect("temp dir");
    let config = home.path().join("broken.toml");
    std::fs::write(&config, "[poll\n").expect("write config");

    let output = opswatch(
        home.path(),
        &["status", "--config", config.to_str().expect("utf-8 path")],
    );
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn poll_once_with_unreachable_sources_prints_empty_list() {
    let home = tempfile::tempdir().expect("temp dir");
    let config = home.path().join("config.toml");
    std::fs::write(
        &config,
        r#"
[api]
dashboard_base_url = "http://127.0.0.1:9"
device_base_url = "http://127.0.0.1:9"
router_base_url = "http://127.0.0.1:9"
connect_timeout_secs = 1
request_timeout_secs = 1
"#,
    )
    .expect("write config");

    let output = opswatch(
        home.path(),
        &["poll-once", "--config", config.to_str().expect("utf-8 path")],
    );
    let list = stdout_json(&output);
    assert_eq!(list, Value::Array(Vec::new()));
}
