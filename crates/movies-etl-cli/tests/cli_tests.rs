//! CLI integration tests for movies-etl.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the movies-etl binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("movies-etl").unwrap();
    for var in [
        "ETL_SOURCE_PATH",
        "ETL_TARGET_DSN",
        "ETL_TARGET_SCHEMA",
        "ETL_CHUNK_SIZE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// A config file that parses and validates.
fn valid_config(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  path: {}", source).unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(
        file,
        "  dsn: host=127.0.0.1 port=1 user=etl dbname=movies connect_timeout=2"
    )
    .unwrap();
    writeln!(file, "  min_pool_size: 1").unwrap();
    writeln!(file, "  max_pool_size: 2").unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--chunk-size"))
        .stdout(predicate::str::contains("ETL_CHUNK_SIZE"))
        .stdout(predicate::str::contains("--skip-foreign-keys"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("movies-etl"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_override_flags_name_their_env_vars() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--source-path"))
        .stdout(predicate::str::contains("ETL_SOURCE_PATH"))
        .stdout(predicate::str::contains("--target-dsn"))
        .stdout(predicate::str::contains("ETL_TARGET_DSN"))
        .stdout(predicate::str::contains("--target-schema"))
        .stdout(predicate::str::contains("ETL_TARGET_SCHEMA"));
}

#[test]
fn test_dsn_env_value_is_hidden_in_help() {
    cmd()
        .env("ETL_TARGET_DSN", "postgresql://etl:hunter2@db/movies")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  path: db.sqlite").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_override_is_rejected_after_loading() {
    let file = valid_config("db.sqlite");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--chunk-size", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("chunk_size"));
}

#[test]
fn test_blank_dsn_from_env_is_rejected() {
    let file = valid_config("db.sqlite");

    cmd()
        .env("ETL_TARGET_DSN", "   ")
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

// =============================================================================
// Exit Code Tests - Connection Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_source_database_exits_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.sqlite");
    let file = valid_config(missing.to_str().unwrap());

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("source"));
}

#[test]
fn test_source_path_override_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("override.sqlite");
    let file = valid_config("db.sqlite");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--source-path",
            missing.to_str().unwrap(),
            "validate",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("override.sqlite"));
}

// =============================================================================
// Signal Tests
// =============================================================================

/// SIGINT while the target is still being opened must not wait for the
/// connection attempt to finish.
#[cfg(unix)]
#[test]
fn test_sigint_during_open_exits_with_code_130() {
    use std::net::TcpListener;
    use std::process::{Command as StdCommand, Stdio};
    use std::thread::sleep;
    use std::time::Duration;

    // Accepts TCP connections but never answers the PostgreSQL startup.
    let silent = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = silent.local_addr().unwrap().port();

    // SQLite opens a zero-length file as an empty database.
    let source = tempfile::NamedTempFile::new().unwrap();
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "source:").unwrap();
    writeln!(config, "  path: {}", source.path().display()).unwrap();
    writeln!(config, "target:").unwrap();
    writeln!(config, "  dsn: host=127.0.0.1 port={} user=etl dbname=movies", port).unwrap();
    writeln!(config, "  min_pool_size: 1").unwrap();
    writeln!(config, "  max_pool_size: 1").unwrap();

    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("movies-etl"))
        .args(["--config", config.path().to_str().unwrap(), "health-check"])
        .env_remove("ETL_TARGET_DSN")
        .env_remove("ETL_SOURCE_PATH")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    sleep(Duration::from_millis(1500));
    let killed = StdCommand::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    // Give the handler time to act, then reset the pending connection so a
    // process still stuck in open fails instead of hanging the test.
    sleep(Duration::from_millis(1000));
    drop(silent);

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(130));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Interrupted"));
}

// =============================================================================
// Subcommand Existence Tests
// =============================================================================

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test database connections"));
}

#[test]
fn test_validate_command_exists() {
    cmd()
        .args(["validate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validate row counts"));
}

// =============================================================================
// Config Path Tests
// =============================================================================

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
