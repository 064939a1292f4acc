// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the REPL loop.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Cursor;

use super::run_with;
use crate::interp::Interp;

fn repl(lines: &str) -> String {
    let (interp, out) = Interp::with_captured_output();
    let mut input = Cursor::new(lines.as_bytes().to_vec());
    let status = run_with(&mut input, interp);
    assert_eq!(status, 0);
    out.text()
}

#[test]
fn statements_share_the_global_frame() {
    let out = repl("int x = 1;\nx += 2;\nprint(x);\n");
    assert_eq!(out, "3\n");
}

#[test]
fn the_trailing_semicolon_is_optional() {
    let out = repl("int x = 5;\nprint(x)\n");
    assert_eq!(out, "5\n");
}

#[test]
fn parse_errors_do_not_poison_the_session() {
    let out = repl("int x = 1;\nint y = ;\nprint(x);\n");
    assert_eq!(out, "1\n");
}

#[test]
fn runtime_errors_recover_to_the_prompt() {
    let out = repl("int x = 7;\n1 / 0;\nprint(x);\n");
    assert_eq!(out, "7\n");
}

#[test]
fn functions_persist_across_statements() {
    let out = repl("int dbl(int n) { return n * 2; }\nprint(dbl(21));\n");
    assert_eq!(out, "42\n");
}

#[test]
fn empty_lines_are_ignored() {
    let out = repl("\n\nprint(1);\n\n");
    assert_eq!(out, "1\n");
}
