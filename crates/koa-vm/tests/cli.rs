// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the command-line driver and the `.b` cache.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::process::Command;

fn koa() -> Command {
    Command::new(env!("CARGO_BIN_EXE_koa"))
}

#[test]
fn runs_a_script_with_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("hello.k");
    fs::write(&script, "print(40 + 2);").unwrap();

    let output = koa().arg(&script).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
}

#[test]
fn exit_builtin_sets_the_status() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("bye.k");
    fs::write(&script, "print(1); exit(3); print(2);").unwrap();

    let output = koa().arg(&script).output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1\n");
}

#[test]
fn uncaught_errors_exit_nonzero_with_a_traceback() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("boom.k");
    fs::write(&script, "int a = 1 / 0;").unwrap();

    let output = koa().arg(&script).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Traceback"), "stderr: {stderr}");
    assert!(stderr.contains("division by zero"), "stderr: {stderr}");
}

#[test]
fn version_flag() {
    let output = koa().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "stdout: {stdout}");
}

#[test]
fn print_flag_disassembles() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("p.k");
    fs::write(&script, "int x = 1; print(x);").unwrap();

    let output = koa().arg("-p").arg(&script).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("STORE_LOCAL"), "stdout: {stdout}");
    assert!(stdout.contains("END_PROGRAM"), "stdout: {stdout}");
}

#[test]
fn bytecode_cache_is_written_and_reused() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("cached.k");
    let cache = dir.path().join("cached.b");
    fs::write(&script, "print(7);").unwrap();

    let output = koa().arg(&script).output().unwrap();
    assert!(output.status.success());
    assert!(cache.exists());

    // The second run loads the cache and behaves identically.
    let output = koa().arg(&script).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "7\n");
}

#[test]
fn stale_cache_is_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("stale.k");
    fs::write(&script, "print(1);").unwrap();
    let output = koa().arg(&script).output().unwrap();
    assert!(output.status.success());

    // Make the source newer than the cache, with a margin coarse
    // timestamps cannot hide.
    std::thread::sleep(std::time::Duration::from_millis(1100));
    fs::write(&script, "print(2);").unwrap();

    let output = koa().arg(&script).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "2\n");
}
