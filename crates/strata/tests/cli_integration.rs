//! CLI integration tests for the Strata command-line interface.
//!
//! These tests do not talk to a platform - they cover argument parsing,
//! help output and configuration errors only.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strata() -> Command {
    Command::cargo_bin("strata").unwrap()
}

/// A command isolated from the user's config, logs and environment.
fn isolated(dir: &TempDir) -> Command {
    let mut cmd = strata();
    cmd.current_dir(dir.path())
        .env("STRATA_CONFIG_DIR", dir.path())
        .env("XDG_DATA_HOME", dir.path())
        .env("HOME", dir.path())
        .env_remove("STRATA_API_URI")
        .env_remove("STRATA_TOKEN");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    strata()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Strata knowledge platform"));
}

#[test]
fn test_version_displays() {
    strata()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strata"));
}

#[test]
fn test_help_lists_subcommands() {
    strata()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("contents"))
        .stdout(predicate::str::contains("feeds"))
        .stdout(predicate::str::contains("workflows"))
        .stdout(predicate::str::contains("specifications"))
        .stdout(predicate::str::contains("conversations"))
        .stdout(predicate::str::contains("ask"));
}

#[test]
fn test_contents_help() {
    strata()
        .args(["contents", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_ask_help_shows_options() {
    strata()
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--conversation"))
        .stdout(predicate::str::contains("--specification"))
        .stdout(predicate::str::contains("--max-rounds"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_requires_prompt() {
    strata()
        .arg("ask")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_unknown_subcommand_fails() {
    strata()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_contents_get_requires_id() {
    strata().args(["contents", "get"]).assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_api_uri_is_reported() {
    let dir = TempDir::new().unwrap();
    isolated(&dir)
        .args(["contents", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("api_uri"))
        .stderr(predicate::str::contains("STRATA_API_URI"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("strata.toml"), "[platform\napi_uri = ").unwrap();
    isolated(&dir)
        .args(["feeds", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}
