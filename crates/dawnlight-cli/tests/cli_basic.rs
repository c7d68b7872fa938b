//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with HOME pointed at a temporary directory
//! and verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_dawnlight"))
        .args(args)
        .env("HOME", home)
        .env("DAWNLIGHT_ENV", "dev")
        .env("DAWNLIGHT_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "CLI command {args:?} failed: {stderr}");
    stdout
}

fn list_json(home: &Path) -> Vec<serde_json::Value> {
    let stdout = run_cli_success(home, &["alarm", "list", "--json"]);
    serde_json::from_str(&stdout).expect("alarm list --json is not JSON")
}

#[test]
fn test_alarm_add_and_list() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_cli_success(
        home.path(),
        &["alarm", "add", "06:45", "--repeat", "1,2,3,4,5", "--sound", "ocean", "--label", "Work"],
    );
    assert!(stdout.contains("Alarm created:"));
    assert!(stdout.contains("Mon,Tue,Wed,Thu,Fri"));

    let alarms = list_json(home.path());
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0]["hour"], 6);
    assert_eq!(alarms[0]["minute"], 45);
    assert_eq!(alarms[0]["sound"], "ocean");
    assert_eq!(alarms[0]["enabled"], true);
    assert_eq!(alarms[0]["sunrise_duration"], 30);
}

#[test]
fn test_alarm_add_rejects_bad_time() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["alarm", "add", "25:00"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
    assert!(list_json(home.path()).is_empty());
}

#[test]
fn test_alarm_toggle_edit_remove() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["alarm", "add", "07:00"]);
    let id = list_json(home.path())[0]["id"].as_str().unwrap().to_string();

    let stdout = run_cli_success(home.path(), &["alarm", "toggle", &id]);
    assert!(stdout.contains("disabled"));
    assert_eq!(list_json(home.path())[0]["enabled"], false);

    run_cli_success(home.path(), &["alarm", "edit", &id, "--time", "07:30", "--sunrise", "15"]);
    let alarm = &list_json(home.path())[0];
    assert_eq!(alarm["minute"], 30);
    assert_eq!(alarm["sunrise_duration"], 15);

    run_cli_success(home.path(), &["alarm", "remove", &id]);
    assert!(list_json(home.path()).is_empty());
    let (_, _, code) = run_cli(home.path(), &["alarm", "remove", &id]);
    assert_ne!(code, 0);
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_cli_success(home.path(), &["config", "get", "engine.default_snooze_minutes"]);
    assert_eq!(stdout.trim(), "9");

    run_cli_success(home.path(), &["config", "set", "engine.default_snooze_minutes", "5"]);
    let stdout = run_cli_success(home.path(), &["config", "get", "engine.default_snooze_minutes"]);
    assert_eq!(stdout.trim(), "5");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "engine.nope", "1"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["config", "get", "engine.nope"]);
    assert_ne!(code, 0);
}

#[test]
fn test_config_list() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_cli_success(home.path(), &["config", "list"]);
    assert!(stdout.contains("sunrise.default_duration_minutes = 30"));
}

#[test]
fn test_sounds() {
    let home = tempfile::tempdir().unwrap();
    let stdout = run_cli_success(home.path(), &["sounds", "--json"]);
    let sounds: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(sounds.len(), 5);
    assert_eq!(sounds[0]["key"], "birds");
    assert_eq!(sounds[0]["name"], "Birds Chirping");
}
