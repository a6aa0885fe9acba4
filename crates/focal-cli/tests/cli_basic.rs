//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each test
//! points HOME at its own temp directory so config and database state stay
//! isolated from the developer's machine and from other tests.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "-p", "focal-cli", "--"])
        .args(args)
        .env("HOME", home)
        .output()
        .expect("failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("output should be JSON")
}

#[test]
fn session_start_prints_a_focus_snapshot() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_cli(home.path(), &["session", "start"]);
    assert_eq!(code, 0, "session start failed: {stderr}");

    let json = parse_json(&stdout);
    assert_eq!(json["type"], "StateSnapshot");
    assert_eq!(json["phase"], "focus");
    assert_eq!(json["planned_minutes"], 180);
    assert_eq!(json["is_completed"], false);
}

#[test]
fn status_is_stable_across_invocations() {
    let home = tempfile::tempdir().unwrap();
    run_cli(home.path(), &["session", "start"]);
    let (code, stdout, _) = run_cli(home.path(), &["session", "status"]);
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    // Same session, so the countdown continues instead of restarting.
    assert_eq!(json["phase"], "focus");
    assert!(json["seconds_remaining"].as_i64().unwrap() <= 180 * 60);
}

#[test]
fn break_and_focus_round_trip() {
    let home = tempfile::tempdir().unwrap();
    run_cli(home.path(), &["session", "start"]);

    let (code, stdout, stderr) = run_cli(home.path(), &["session", "break"]);
    assert_eq!(code, 0, "session break failed: {stderr}");
    assert_eq!(parse_json(&stdout)["type"], "BreakStarted");

    let (code, stdout, _) = run_cli(home.path(), &["session", "break"]);
    assert_eq!(code, 0);
    assert_eq!(parse_json(&stdout)["type"], "BreakExtended");

    let (code, stdout, _) = run_cli(home.path(), &["session", "focus"]);
    assert_eq!(code, 0);
    assert_eq!(parse_json(&stdout)["type"], "FocusResumed");
}

#[test]
fn exhausted_break_budget_is_reported_not_fatal() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(
        home.path(),
        &["config", "set", "timer.break_budget_minutes", "5"],
    );
    assert_eq!(code, 0, "config set failed: {stderr}");

    run_cli(home.path(), &["session", "start"]);
    let (code, stdout, _) = run_cli(home.path(), &["session", "break"]);
    assert_eq!(code, 0);
    assert_eq!(parse_json(&stdout)["break_minutes_remaining"], 0);

    let (code, stdout, _) = run_cli(home.path(), &["session", "break"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("not enough break budget"), "got: {stdout}");
}

#[test]
fn save_prints_the_completion_summary() {
    let home = tempfile::tempdir().unwrap();
    run_cli(home.path(), &["session", "start"]);
    let (code, stdout, stderr) = run_cli(home.path(), &["session", "save"]);
    assert_eq!(code, 0, "session save failed: {stderr}");
    let json = parse_json(&stdout);
    assert_eq!(json["type"], "SessionCompleted");
    assert_eq!(json["total_minutes_done"], 0);
    assert_eq!(json["total_minutes_done_rounded"], 0);
}

#[test]
fn discard_drops_the_session() {
    let home = tempfile::tempdir().unwrap();
    run_cli(home.path(), &["session", "start"]);
    let (code, stdout, _) = run_cli(home.path(), &["session", "discard"]);
    assert_eq!(code, 0);
    assert_eq!(parse_json(&stdout)["type"], "SessionDiscarded");
}

#[test]
fn config_get_set_list() {
    let home = tempfile::tempdir().unwrap();

    let (code, stdout, _) = run_cli(
        home.path(),
        &["config", "get", "timer.planned_focus_minutes"],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "180");

    let (code, _, _) = run_cli(
        home.path(),
        &["config", "set", "timer.planned_focus_minutes", "90"],
    );
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(
        home.path(),
        &["config", "get", "timer.planned_focus_minutes"],
    );
    assert_eq!(stdout.trim(), "90");

    let (code, stdout, _) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(code, 0);
    let json = parse_json(&stdout);
    assert_eq!(json["timer"]["planned_focus_minutes"], 90);
    assert_eq!(json["session"]["user_id"], 1);
}

#[test]
fn config_rejects_invalid_values() {
    let home = tempfile::tempdir().unwrap();
    // 7 is not a multiple of the 5-minute break increment.
    let (code, _, stderr) = run_cli(
        home.path(),
        &["config", "set", "timer.break_budget_minutes", "7"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("invalid configuration value"), "got: {stderr}");

    let (code, _, stderr) = run_cli(home.path(), &["config", "get", "timer.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"), "got: {stderr}");
}
