//! CLI integration tests for deep-compare.
//!
//! These tests cover argument parsing, help output, the offline
//! `show-exclude-columns` command and exit codes for configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const ENV_VARS: [&str; 12] = [
    "DB1_HOST",
    "DB1_PORT",
    "DB1_DATABASE",
    "DB1_USERNAME",
    "DB1_PASSWORD",
    "DB1_SSL_MODE",
    "DB2_HOST",
    "DB2_PORT",
    "DB2_DATABASE",
    "DB2_USERNAME",
    "DB2_PASSWORD",
    "DB2_SSL_MODE",
];

/// Get a command for the deep-compare binary with no database env vars set.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("deep-compare").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
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
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("find-references"))
        .stdout(predicate::str::contains("analyze-references"))
        .stdout(predicate::str::contains("generate-script"))
        .stdout(predicate::str::contains("show-exclude-columns"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("deep-compare"));
}

#[test]
fn test_compare_subcommand_help() {
    cmd()
        .args(["compare", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--exclude"))
        .stdout(predicate::str::contains("--include-pk"))
        .stdout(predicate::str::contains("--exclude-file"))
        .stdout(predicate::str::contains("--surface-duplicates"))
        .stdout(predicate::str::contains("[default: public]"));
}

#[test]
fn test_generate_script_subcommand_help() {
    cmd()
        .args(["generate-script", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--id-target"))
        .stdout(predicate::str::contains("--id-destination"))
        .stdout(predicate::str::contains("--source-db"));
}

#[test]
fn test_global_flags_listed() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--max-workers"))
        .stdout(predicate::str::contains("--decode-uuids"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_compare_requires_table() {
    cmd()
        .arg("compare")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--table"));
}

#[test]
fn test_invalid_source_db_rejected() {
    cmd()
        .args([
            "generate-script",
            "--table",
            "users",
            "--id-target",
            "1",
            "--id-destination",
            "2",
            "--source-db",
            "db3",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("db3"));
}

// =============================================================================
// show-exclude-columns
// =============================================================================

#[test]
fn test_show_exclude_columns_lists_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# audit columns").unwrap();
    writeln!(file, "created_at").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "  updated_at  ").unwrap();

    cmd()
        .args([
            "show-exclude-columns",
            "--exclude-file",
            file.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("created_at"))
        .stdout(predicate::str::contains("updated_at"))
        .stdout(predicate::str::contains("audit").not())
        .stdout(predicate::str::contains("Total: 2"));
}

#[test]
fn test_show_exclude_columns_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "created_at").unwrap();

    cmd()
        .args([
            "--output-json",
            "show-exclude-columns",
            "--exclude-file",
            file.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[\n  \"created_at\"\n]"));
}

#[test]
fn test_show_exclude_columns_missing_file() {
    cmd()
        .args([
            "show-exclude-columns",
            "--exclude-file",
            "nonexistent_exclude_columns.txt",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nonexistent_exclude_columns.txt"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_without_env_exits_with_code_2() {
    // No file and no DB1_*/DB2_* variables: validation fails
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("database1.database is required"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_same_database_twice_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database1:").unwrap();
    writeln!(file, "  database: app").unwrap();
    writeln!(file, "  user: postgres").unwrap();
    writeln!(file, "database2:").unwrap();
    writeln!(file, "  database: app").unwrap();
    writeln!(file, "  user: postgres").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_zero_workers_override_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database1:").unwrap();
    writeln!(file, "  database: app").unwrap();
    writeln!(file, "  user: postgres").unwrap();
    writeln!(file, "database2:").unwrap();
    writeln!(file, "  database: app_copy").unwrap();
    writeln!(file, "  user: postgres").unwrap();

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--max-workers",
            "0",
            "health-check",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("max_workers"));
}

#[test]
fn test_invalid_ssl_mode_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database1:").unwrap();
    writeln!(file, "  database: app").unwrap();
    writeln!(file, "  user: postgres").unwrap();
    writeln!(file, "  ssl_mode: prefer").unwrap();
    writeln!(file, "database2:").unwrap();
    writeln!(file, "  database: app_copy").unwrap();
    writeln!(file, "  user: postgres").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("database1: invalid ssl_mode 'prefer'"));
}
