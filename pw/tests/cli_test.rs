//! CLI tests for the pw binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn pw() -> Command {
    Command::cargo_bin("pw").unwrap()
}

#[test]
fn test_help_lists_commands() {
    pw().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("controller"))
        .stdout(predicate::str::contains("(Deprecated) Alias of `serve`"));
}

#[test]
fn test_controller_help_lists_subcommands() {
    pw().args(["controller", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("plans"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("pause"));
}

#[test]
fn test_version() {
    pw().arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unreachable_server_reports_connection_failure() {
    pw().args(["controller", "--url", "http://127.0.0.1:1", "state"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to establish connection to server"));
}

#[test]
fn test_missing_explicit_config_fails() {
    pw().args(["-c", "/definitely/not/here.yml", "controller", "state"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_config_file_supplies_server_url() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api:\n  host: 127.0.0.1\n  port: 1").unwrap();

    pw().args(["-c", file.path().to_str().unwrap(), "controller", "plans"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("http://127.0.0.1:1"));
}

#[test]
fn test_run_rejects_non_object_parameters() {
    pw().args(["controller", "--url", "http://127.0.0.1:1", "run", "count", "-p", "[1]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parameters must be a JSON object"));
}
