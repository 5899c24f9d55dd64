#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Output, Stdio};

const READING_FRAME: &str = ":xASL1805180000r0400000000301010101011501F609\
    000000000000000000000000000000000000000000000000000000000000000000000000000000000000\
    83445587834455870001AAB6";

fn aslbus(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_aslbus"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("aslbus should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

#[test]
fn version_prints_package_version() {
    let output = aslbus(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("aslbus {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn encode_prints_wire_text() {
    let output = aslbus(&["encode", "ASL1805180001", "$0", "--payload", "23"]);
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["raw"], ":!ASL1805180001$0010023043E");
    assert_eq!(json["checksum"], "043E");
    assert_eq!(json["command_name"], "PING");
    assert_eq!(json["byte_count"], 1);
}

#[test]
fn encode_rejects_bad_fields_with_usage_code() {
    let output = aslbus(&["encode", "ASL18", "$0"]);
    assert_eq!(output.status.code(), Some(64));

    let output = aslbus(&["encode", "ASL1805180001", "$0", "--payload", "XYZ"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_reading_frame_includes_values() {
    let output = aslbus(&["decode", READING_FRAME]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json["address"], "x");
    assert_eq!(json["serial"], "ASL1805180000");
    assert_eq!(json["byte_count"], 64);
    assert_eq!(json["reading"]["firmware_version"], "V2.59");
    assert_eq!(json["reading"]["ec"], 2.77);
    assert_eq!(json["reading"]["temperature"], 25.5);
    assert_eq!(json["reading"]["signal"], 1);
}

#[test]
fn decode_reads_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_aslbus"))
        .args(["--log-level", "error", "--format", "json", "decode"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("decode should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"UU:xASL1805180001$00100235732\x04")
        .expect("stdin write should succeed");
    let output = child.wait_with_output().expect("decode should finish");

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["payload"], "23");
    assert!(json.get("reading").is_none());
}

#[test]
fn decode_bad_checksum_is_invalid_data() {
    let output = aslbus(&["decode", ":xASL1805180001$00100230000"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rx: 0x0000, calc: 0x5732"), "{stderr}");
}

#[test]
fn decode_master_frame_is_rejected() {
    let output = aslbus(&["decode", ":!ASL1805180001$0010023043E"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("from a master"), "{stderr}");
}
