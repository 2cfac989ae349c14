//! Container-runtime scenarios. These need a reachable Docker daemon, so
//! they're `#[ignore]`d by default — run with `cargo test -- --ignored`
//! against a machine that has one.

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
#[ignore]
fn test_container_action_lists_root() {
    let tmp = tempfile::tempdir().unwrap();
    write_action(
        tmp.path(),
        "actions/ls",
        "action: {title: List}\nruntime: {type: container, image: alpine:3, command: [ls, /]}\n",
    );
    launchr()
        .args(["--actions-dir", tmp.path().to_str().unwrap(), "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bin"));
}

#[test]
#[ignore]
fn test_detach_sequence_leaves_container_running() {
    // Exercising the interactive Ctrl-P Ctrl-Q path needs a real pty and a
    // long-running container; covered manually, not under `cargo test`.
}
