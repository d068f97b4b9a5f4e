//! CLI tests for the bcast binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary isolated from the user's config and log directories
fn bcast(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bcast").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    bcast(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("buffer-capacity: 1000"))
        .stdout(predicate::str::contains("subscriber-capacity: 100"));
}

#[test]
fn test_config_reads_local_file() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".bcast.yml"), "broadcaster:\n  buffer-capacity: 7\n").unwrap();

    bcast(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("buffer-capacity: 7"));
}

#[test]
fn test_config_write_round_trips_through_load() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("written.yml");

    bcast(&home)
        .args(["config", "--write"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote config"));

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("buffer-capacity: 1000"));

    bcast(&home)
        .arg("--config")
        .arg(&out)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("messages-per-producer: 1000"));
}

#[test]
fn test_drill_json_report() {
    let home = TempDir::new().unwrap();
    bcast(&home)
        .args(["drill", "-p", "2", "-s", "3", "-m", "20", "-b", "0", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"complete\": true"))
        .stdout(predicate::str::contains("\"in_order\": true"))
        .stdout(predicate::str::contains("\"submitted\": 40"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let home = TempDir::new().unwrap();
    bcast(&home).arg("frobnicate").assert().failure();
}
