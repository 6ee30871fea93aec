#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn omsync(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_omsync"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .env_remove("OMSYNC_DEVICES")
        .env_remove("OMSYNC_BAUD")
        .env_remove("OMSYNC_TIMEOUT")
        .output()
        .expect("omsync should run")
}

fn missing_device() -> String {
    format!("/tmp/omsync-missing-{}/ttyACM0", std::process::id())
}

#[test]
fn version_prints_package_version() {
    let output = omsync(&["version"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("omsync {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_lists_features() {
    let output = omsync(&["version", "--extended"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: omsync"));
    assert!(stdout.contains("cli=true"));
}

#[test]
fn probe_without_device_is_transport_error() {
    let device = missing_device();
    let output = omsync(&["probe", "--devices", &device]);

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open failed"), "stderr: {stderr}");
}

#[test]
fn probe_on_non_tty_is_transport_error() {
    let output = omsync(&["probe", "--devices", "/dev/null"]);

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn unsupported_baud_is_usage_error() {
    let device = missing_device();
    let output = omsync(&["probe", "--devices", &device, "--baud", "12345"]);

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn zero_timeout_is_usage_error() {
    let output = omsync(&["watch", "--timeout", "0s"]);

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("greater than zero"), "stderr: {stderr}");
}

#[test]
fn devices_can_come_from_environment() {
    let device = missing_device();
    let output = Command::new(env!("CARGO_BIN_EXE_omsync"))
        .args(["--log-level", "error", "gcode", "M122"])
        .env("OMSYNC_DEVICES", &device)
        .env_remove("OMSYNC_BAUD")
        .env_remove("OMSYNC_TIMEOUT")
        .output()
        .expect("omsync should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("among 1 candidate"), "stderr: {stderr}");
}
