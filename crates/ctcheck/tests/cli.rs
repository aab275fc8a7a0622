//! Exit codes and output of the ctcheck binary.

mod common;

use std::process::{Command, Output};

use common::temp_file;

const LISTING: &str = "
    _imem_start:
        jal x1, leaky
        ecall
    leaky:
        beq x5, x0, out
        nop
    out:
        ret
";

fn ctcheck(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ctcheck"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_clean_exit_code() {
    let file = temp_file(LISTING.as_bytes());
    let path = file.path().to_str().unwrap();

    let out = ctcheck(&[path, "--listing", "--secrets", "x6"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("entire program: no secret-dependent control flow"));
}

#[test]
fn test_findings_exit_code() {
    let file = temp_file(LISTING.as_bytes());
    let path = file.path().to_str().unwrap();

    let out = ctcheck(&[path, "--listing", "--subroutine", "leaky", "--secrets", "x5"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("subroutine leaky: the following secrets may influence control flow:"));
    assert!(stdout.contains("x5: 0x00000008 <leaky>"));
}

#[test]
fn test_json_output() {
    let file = temp_file(LISTING.as_bytes());
    let path = file.path().to_str().unwrap();

    let out = ctcheck(&[path, "--listing", "--format", "json"]);
    assert_eq!(out.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["passed"], false);
    assert_eq!(json["results"][0]["target"], "entire program");
    assert_eq!(json["results"][0]["findings"]["x5"], serde_json::json!([8]));
}

#[test]
fn test_errors_exit_with_failure() {
    let file = temp_file(LISTING.as_bytes());
    let path = file.path().to_str().unwrap();

    let out = ctcheck(&[path, "--listing", "--subroutine", "missing"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("missing"));

    let out = ctcheck(&[path, "--listing", "--constants", "x5:0"]);
    assert_eq!(out.status.code(), Some(1));
}
