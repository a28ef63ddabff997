//! CLI integration tests using assert_cmd.
//!
//! These tests invoke the actual `coldvault` binary and verify its output.
//! They never talk to a running gateway; commands that need one are tested
//! against an unreachable port and must fail with a helpful message.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn coldvault_cmd() -> Command {
    Command::cargo_bin("coldvault").expect("binary should exist")
}

#[test]
fn test_version_flag() {
    coldvault_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("coldvault"));
}

#[test]
fn test_help_lists_subcommands() {
    coldvault_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("vault"))
        .stdout(predicate::str::contains("jobs"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_no_subcommand_prints_help() {
    coldvault_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_vault_help() {
    coldvault_cmd()
        .args(["vault", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("records"))
        .stdout(predicate::str::contains("inventory"));
}

#[test]
fn test_status_against_unreachable_gateway_fails_helpfully() {
    coldvault_cmd()
        .args(["--port", "1", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not connect"));
}

#[test]
fn test_vault_list_against_unreachable_gateway_fails_helpfully() {
    coldvault_cmd()
        .args(["--port", "1", "vault", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("coldvault serve"));
}

#[test]
fn test_serve_rejects_missing_config_file() {
    coldvault_cmd()
        .args(["serve", "--config", "/nonexistent/coldvault.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
