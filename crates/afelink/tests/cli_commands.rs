#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn afelink(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_afelink"))
        .env_remove("AFELINK_PORT")
        .env_remove("AFELINK_BAUD")
        .env_remove("AFELINK_TIMEOUT")
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("afelink should run")
}

fn missing_port() -> String {
    format!("/dev/afelink-missing-{}", std::process::id())
}

#[test]
fn version_prints_package_version() {
    let output = afelink(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("afelink {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn version_extended_lists_defaults() {
    let output = afelink(&["version", "--extended"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("default_baud: 9600"));
    assert!(stdout.contains("default_timeout_ms: 50"));
}

#[test]
fn device_command_without_port_is_usage_error() {
    let output = afelink(&["rd", "0x400"]);
    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("AFELINK_PORT"), "{stderr}");
}

#[test]
fn missing_device_is_transport_error() {
    let port = missing_port();
    let output = afelink(&["--port", &port, "rd", "0x400"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open failed"), "{stderr}");
}

#[test]
fn port_is_read_from_environment() {
    let port = missing_port();
    let output = Command::new(env!("CARGO_BIN_EXE_afelink"))
        .env("AFELINK_PORT", &port)
        .args(["--log-level", "error", "reset"])
        .output()
        .expect("afelink should run");
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(&port), "{stderr}");
}

#[test]
fn call_rejects_non_object_params_before_opening() {
    let port = missing_port();
    let output = afelink(&["--port", &port, "call", "rd", "--params", "[1]"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn bad_timeout_is_usage_error() {
    let port = missing_port();
    let output = afelink(&["--port", &port, "--timeout", "soon", "rd", "0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn ports_lists_or_reports_enumeration_failure() {
    let output = afelink(&["--format", "json", "ports"]);
    match output.status.code() {
        Some(0) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let parsed: serde_json::Value =
                serde_json::from_str(stdout.trim()).expect("ports output should be JSON");
            assert!(parsed.is_array());
        }
        Some(3) => {}
        other => panic!("unexpected exit code {other:?}"),
    }
}
