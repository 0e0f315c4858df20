//! Integration tests for CLI commands.
//!
//! These tests run the binary against a throwaway config directory and
//! never need everpad or a tray host.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the binary with its config isolated in `home`
fn indicator(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("everpad-indicator").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("HOME", home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_command() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("everpad"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("everpad-indicator"));
}

#[test]
fn test_config_show_defaults() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[hotkey]"))
        .stdout(predicate::str::contains("Super+E"))
        .stdout(predicate::str::contains("show_panel_progress = true"));
}

#[test]
fn test_config_set_hotkey_persists() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .args(["config", "--hotkey", "<Control><Alt>n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hotkey set to <Control><Alt>n"));

    indicator(&home)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<Control><Alt>n"));
}

#[test]
fn test_config_invalid_hotkey() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .args(["config", "--hotkey", "Super+Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown key"));
}

#[test]
fn test_config_broken_file_is_reported() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("config").join("everpad-indicator");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[hotkey\n").unwrap();

    indicator(&home)
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_status_without_everpad() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .arg("status")
        .env_remove("DBUS_SESSION_BUS_ADDRESS")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn test_status_leaves_config_untouched() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .arg("status")
        .env_remove("DBUS_SESSION_BUS_ADDRESS")
        .assert()
        .success();

    assert!(!home
        .path()
        .join("config")
        .join("everpad-indicator")
        .join("config.toml")
        .exists());
}

#[test]
fn test_first_config_run_logs_saved_path() {
    let home = TempDir::new().unwrap();
    indicator(&home)
        .args(["config", "--show"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Config saved to"));
}
