//! CLI integration tests

use std::process::Command;

fn sentinelctl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sentinelctl"));
    cmd.env_remove("SENTINEL_API_URL");
    cmd
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = sentinelctl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Device Sentinel"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("latest"), "Should show latest command");
    assert!(stdout.contains("series"), "Should show series command");
    assert!(stdout.contains("watch"), "Should show watch command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = sentinelctl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("sentinelctl"), "Should show binary name");
}

/// Test series subcommand help
#[test]
fn test_series_help() {
    let output = sentinelctl()
        .args(["series", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Series help should succeed");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

/// Test that an unreachable agent is reported as a failure
#[test]
fn test_unreachable_agent_fails() {
    let output = sentinelctl()
        .args(["--api-url", "http://127.0.0.1:9", "status"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Status against a closed port should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Failed to send request"),
        "Should explain the failure"
    );
}

/// Test that an invalid command shows error
#[test]
fn test_invalid_command() {
    let output = sentinelctl()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid command should fail");
}
