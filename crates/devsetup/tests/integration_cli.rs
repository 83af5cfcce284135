//! CLI tests that never reach an interactive prompt.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn devsetup(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("devsetup").unwrap();
    cmd.current_dir(home)
        .env_remove("DEVSETUP_CONFIG")
        .env_remove("DEVSETUP_LOG")
        .env_remove("RUST_LOG")
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

/// Configuration whose tools do not exist on any machine
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("devsetup.toml");
    let state = dir.join("state.json");
    fs::write(
        &path,
        format!(
            r#"state_file = '{}'

[tools]
editor = "devsetup-test-missing-editor"
toolchain = "devsetup-test-missing-toolchain"
sync_tool = "devsetup-test-missing-sync"
"#,
            state.display()
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_help_output() {
    let dir = TempDir::new().unwrap();
    devsetup(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--reset"))
        .stdout(predicate::str::contains("--verify"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_version_output() {
    let dir = TempDir::new().unwrap();
    for flag in ["--version", "-v"] {
        devsetup(dir.path())
            .arg(flag)
            .assert()
            .success()
            .stdout(predicate::str::contains(format!(
                "devsetup {}",
                env!("CARGO_PKG_VERSION")
            )));
    }
}

#[test]
fn test_unknown_flag_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    devsetup(dir.path())
        .arg("--no-such-flag")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--no-such-flag"));
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    devsetup(dir.path())
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devsetup.toml");
    fs::write(&path, "unknown_key = true\n").unwrap();
    devsetup(dir.path())
        .arg("--config")
        .arg(&path)
        .arg("--verify")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_verify_reports_missing_tools() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    devsetup(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--verify")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Verification Report"))
        .stdout(predicate::str::contains(
            "`devsetup-test-missing-editor` is not on PATH",
        ))
        .stdout(predicate::str::contains("needs you to confirm"));
}

#[test]
fn test_verify_uses_saved_progress() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let project = dir.path().join("obby");
    fs::create_dir_all(&project).unwrap();
    let record = serde_json::json!({
        "version": "1.0",
        "timestamp": "2026-01-01T00:00:00Z",
        "currentStateIndex": 6,
        "completedStates": ["welcome", "editor", "toolchain", "sync-tool", "extension", "project"],
        "context": { "projectName": "obby", "projectPath": project.display().to_string() }
    });
    let state = dir.path().join("state.json");
    fs::write(&state, serde_json::to_string(&record).unwrap()).unwrap();

    devsetup(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--verify")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("has no default.project.json"));

    // Verification never rewrites the record
    let after: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state).unwrap()).unwrap();
    assert_eq!(after, record);
}

#[test]
fn test_corrupted_state_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let other = dir.path().join("other-state.json");
    fs::write(&other, "{ not json").unwrap();

    devsetup(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--state-file")
        .arg(&other)
        .arg("--verify")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Verification Report"))
        .stderr(predicate::str::contains("No saved progress found"));
}
