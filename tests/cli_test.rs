//! Tests of the `cyclepay` binary's argument handling and exit codes

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "CYCLEPAY_LOG_LEVEL",
    "CYCLEPAY_BIND",
    "CYCLEPAY_STORAGE_TYPE",
    "CYCLEPAY_STORAGE_DIR",
    "CYCLEPAY_PROVIDER_URL",
    "CYCLEPAY_PROVIDER_TOKEN",
    "CYCLEPAY_CHUNK_SIZE",
    "CYCLEPAY_ALLOW_UNSEALED_DISBURSEMENT",
    "CYCLEPAY_SELECTION_SEED",
];

/// The binary with a scratch home and no `CYCLEPAY_*` variables
fn cyclepay(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cyclepay").unwrap();
    cmd.env("HOME", home);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    cyclepay(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve").and(predicate::str::contains("watch")));
}

#[test]
fn test_watch_needs_cycle_or_batch() {
    let home = TempDir::new().unwrap();
    cyclepay(home.path())
        .arg("watch")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--cycle").or(predicate::str::contains("--batch")));

    cyclepay(home.path())
        .args(["watch", "--cycle", "q3", "--batch", "b1"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_config_file_is_a_config_error() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope.yml");
    cyclepay(home.path())
        .arg("--config")
        .arg(&missing)
        .arg("serve")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_invalid_env_override_is_reported() {
    let home = TempDir::new().unwrap();
    cyclepay(home.path())
        .env("CYCLEPAY_CHUNK_SIZE", "lots")
        .args(["-v", "serve"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("CYCLEPAY_CHUNK_SIZE"));
}

#[test]
fn test_serve_requires_provider_url() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.yml");
    std::fs::write(&config, "storage:\n  backend: memory\n").unwrap();

    cyclepay(home.path())
        .arg("-v")
        .arg("--config")
        .arg(&config)
        .arg("serve")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("provider.base_url"));
}
