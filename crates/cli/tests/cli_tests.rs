//! CLI integration tests

use std::process::{Command, Output};

fn hmpi(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hmpi"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("HMPI_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = hmpi(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Heavy Metal Pollution Index"),
        "Should show app name"
    );
    assert!(stdout.contains("indices"), "Should show indices command");
    assert!(stdout.contains("analyze"), "Should show analyze command");
    assert!(stdout.contains("batch"), "Should show batch command");
    assert!(stdout.contains("samples"), "Should show samples command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = hmpi(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("hmpi"), "Should show binary name");
}

#[test]
fn test_samples_delete_help() {
    let output = hmpi(&["samples", "delete", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--all"));
    assert!(stdout.contains("--ids"));
    assert!(stdout.contains("--from"));
}

#[test]
fn test_batch_submit_help() {
    let output = hmpi(&["batch", "submit", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--metals"));
}

/// Test that invalid commands fail gracefully
#[test]
fn test_invalid_command() {
    let output = hmpi(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_conflicting_delete_flags_rejected() {
    let output = hmpi(&["samples", "delete", "--all", "--ids", "a,b"]);
    assert!(!output.status.success());
}

/// Offline computation needs no running service
#[test]
fn test_indices_offline_table() {
    let output = hmpi(&["indices", "arsenic=50", "lead=5"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("HMPI"));
    assert!(stdout.contains("Critical"));
    assert!(stdout.contains("Non-Compliant"));
    assert!(stdout.contains("High arsenic levels detected"));
}

#[test]
fn test_indices_offline_json() {
    let output = hmpi(&["--format", "json", "indices", "lead=5", "arsenic=5"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["indices"]["hmpi"]["score"], 50.0);
    assert_eq!(json["indices"]["hmpi"]["band"], "Safe");
    assert_eq!(json["recommendations"]["compliance_status"], "Compliant");
}

#[test]
fn test_indices_rejects_bad_measurement() {
    let output = hmpi(&["indices", "lead"]);
    assert!(!output.status.success());

    let output = hmpi(&["indices", "kryptonite=4"]);
    assert!(!output.status.success());
}
