//! Black-box CLI scenarios that don't need a container runtime: discovery,
//! shell execution, and the load-time failure modes.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn launchr() -> Command {
    Command::cargo_bin("launchr").unwrap()
}

fn write_action(root: &std::path::Path, rel_dir: &str, body: &str) {
    let dir = root.join(rel_dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("action.yaml"), body).unwrap();
}

#[test]
fn test_help_lists_discovered_action() {
    let tmp = tempfile::tempdir().unwrap();
    write_action(
        tmp.path(),
        "actions/echo",
        "action: {title: Echoes its argument}\nruntime: {type: shell, command: [echo, '{{ .name }}']}\n",
    );
    launchr()
        .args(["--actions-dir", tmp.path().to_str().unwrap(), "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("echo"));
}

#[test]
fn test_shell_action_runs_and_echoes_stdout() {
    let tmp = tempfile::tempdir().unwrap();
    write_action(
        tmp.path(),
        "actions/hello",
        "action:\n  title: Hello\n  arguments:\n    - {name: NAME}\nruntime:\n  type: shell\n  command: [echo, \"hi {{ .NAME }}\"]\n",
    );
    launchr()
        .args(["--actions-dir", tmp.path().to_str().unwrap(), "hello", "world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hi world"));
}

#[test]
fn test_missing_template_variable_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    write_action(
        tmp.path(),
        "actions/broken",
        "action: {title: Broken}\nruntime: {type: shell, command: [echo, '{{ .UNDEFINED }}']}\n",
    );
    launchr()
        .args(["--actions-dir", tmp.path().to_str().unwrap(), "broken"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("never defined"));
}

#[test]
fn test_unsupported_version_is_a_broken_action_not_a_crash() {
    let tmp = tempfile::tempdir().unwrap();
    write_action(
        tmp.path(),
        "actions/too-new",
        "version: \"2\"\naction: {title: Too New}\nruntime: {type: shell, command: [echo, hi]}\n",
    );
    launchr()
        .args(["--actions-dir", tmp.path().to_str().unwrap(), "--help"])
        .assert()
        .success();
    launchr()
        .args(["--actions-dir", tmp.path().to_str().unwrap(), "too-new"])
        .assert()
        .code(125)
        .stderr(predicate::str::contains("unsupported version \"2\""));
}
