//! Binary-level smoke tests for the `backlog` CLI.

use assert_cmd::Command;
use predicates::prelude::*;

fn backlog_cmd(root: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("backlog").unwrap();
    cmd.arg("--root").arg(root);
    cmd
}

#[test]
fn init_creates_the_store_layout() {
    let dir = tempfile::TempDir::new().unwrap();

    backlog_cmd(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized empty backlog"));

    assert!(dir.path().join("tasks/backlog.json").exists());
}

#[test]
fn init_twice_is_harmless() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();
    backlog_cmd(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn add_show_update_flow() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();

    backlog_cmd(dir.path())
        .args(["add", "TASK-001", "Build the codec", "--priority", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TASK-001"));

    backlog_cmd(dir.path())
        .args(["show", "TASK-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Build the codec\""))
        .stdout(predicate::str::contains("\"not-started\""));

    backlog_cmd(dir.path())
        .args(["update", "TASK-001", "--status", "in-progress"])
        .assert()
        .success()
        .stdout(predicate::str::contains("in-progress"));
}

#[test]
fn invalid_transition_exits_with_validation_code() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();
    backlog_cmd(dir.path())
        .args(["add", "TASK-001", "Fresh"])
        .assert()
        .success();

    backlog_cmd(dir.path())
        .args(["update", "TASK-001", "--status", "completed"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid status transition"));
}

#[test]
fn missing_task_exits_with_not_found_code() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();

    backlog_cmd(dir.path())
        .args(["show", "TASK-404"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn uninitialized_store_exits_with_guidance() {
    let dir = tempfile::TempDir::new().unwrap();

    backlog_cmd(dir.path())
        .arg("status")
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("backlog init"));
}

#[test]
fn status_reports_counts() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();
    backlog_cmd(dir.path())
        .args(["add", "TASK-001", "One"])
        .assert()
        .success();
    backlog_cmd(dir.path())
        .args(["add", "TASK-002", "Two"])
        .assert()
        .success();

    backlog_cmd(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("total: 2"))
        .stdout(predicate::str::contains("not-started: 2"));
}

#[test]
fn health_runs_clean_on_fresh_backlog() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();
    backlog_cmd(dir.path())
        .args(["add", "TASK-001", "One"])
        .assert()
        .success();

    backlog_cmd(dir.path())
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("Task health"));
}

#[test]
fn resolve_reports_when_nothing_to_do() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();

    backlog_cmd(dir.path())
        .arg("resolve")
        .assert()
        .success()
        .stdout(predicate::str::contains("already resolved"));
}

#[test]
fn events_lists_recent_mutations() {
    let dir = tempfile::TempDir::new().unwrap();
    backlog_cmd(dir.path()).arg("init").assert().success();
    backlog_cmd(dir.path())
        .args(["add", "TASK-001", "One"])
        .assert()
        .success();

    backlog_cmd(dir.path())
        .args(["events", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add_task"))
        .stdout(predicate::str::contains("TASK-001"));
}
