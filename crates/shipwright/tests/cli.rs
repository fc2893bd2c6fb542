//! Command line behaviour of the shipwright binary.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn shipwright(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("shipwright").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("NO_GRAPHICS", "1");
    cmd
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    shipwright(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_init_then_check() {
    let dir = TempDir::new().unwrap();
    shipwright(&dir).arg("init").assert().success();
    assert!(dir.path().join(".shipwright.yml").is_file());

    shipwright(&dir)
        .args(["check", "--print"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name_template"))
        .stdout(predicate::str::contains("windows"));

    shipwright(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_check_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.yml"), "builds: [{id: a}, {id: a}]\n").unwrap();
    shipwright(&dir)
        .args(["check", "-f", "bad.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("found 2 builds with the ID 'a'"));
}

#[test]
fn test_release_with_missing_config_file() {
    let dir = TempDir::new().unwrap();
    shipwright(&dir)
        .args(["release", "--snapshot", "-f", "missing.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.yml"));
}

#[test]
fn test_release_outside_repository_requires_snapshot() {
    let dir = TempDir::new().unwrap();
    shipwright(&dir)
        .args(["release", "--skip-publish"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a git repository"));
}
