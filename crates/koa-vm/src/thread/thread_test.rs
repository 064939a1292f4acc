// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for worker threads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::rc::Rc;

use crate::compiler;
use crate::interp::Interp;

fn run_ok(src: &str) -> String {
    let (mut interp, out) = Interp::with_captured_output();
    let code = compiler::compile_source(&mut interp.heap, src, "test.k").unwrap();
    assert_eq!(interp.execute_module(Rc::new(code)), 0);
    out.text()
}

#[test]
fn spawn_and_join_return_the_child_value() {
    let src = "
        int add(int a, int b) { return a + b; }
        long t = spawn(add, 3, 4);
        print(join(t));
    ";
    assert_eq!(run_ok(src), "7\n");
}

#[test]
fn join_rebuilds_containers() {
    let src = "
        vec pair(int a, int b) { vec v; v[0] = a; v[1] = b; return v; }
        long t = spawn(pair, 1, 2);
        vec r = join(t);
        print(r[0] + r[1]);
    ";
    assert_eq!(run_ok(src), "3\n");
}

#[test]
fn workers_run_in_parallel() {
    let src = "
        int sq(int n) { return n * n; }
        long a = spawn(sq, 5);
        long b = spawn(sq, 6);
        print(join(a) + join(b));
    ";
    assert_eq!(run_ok(src), "61\n");
}

#[test]
fn join_unknown_id_yields_null() {
    assert_eq!(run_ok("print(join(99l));"), "null\n");
}

#[test]
fn cancel_discards_the_result() {
    let src = "
        int one() { return 1; }
        long t = spawn(one);
        cancel(t);
        print(join(t));
    ";
    assert_eq!(run_ok(src), "null\n");
}

#[test]
fn spawn_checks_the_callee_arity() {
    let src = "
        int add(int a, int b) { return a + b; }
        long t = spawn(add, 1);
    ";
    let (mut interp, _out) = Interp::with_captured_output();
    let code = compiler::compile_source(&mut interp.heap, src, "test.k").unwrap();
    assert_eq!(interp.execute_module(Rc::new(code)), 1);
}

#[test]
fn spawn_rejects_builtins() {
    let src = "long t = spawn(print, 1);";
    let (mut interp, _out) = Interp::with_captured_output();
    let code = compiler::compile_source(&mut interp.heap, src, "test.k").unwrap();
    assert_eq!(interp.execute_module(Rc::new(code)), 1);
}

#[test]
fn child_errors_surface_as_null() {
    let src = "
        int bad() { return 1 / 0; }
        long t = spawn(bad);
        print(join(t));
    ";
    assert_eq!(run_ok(src), "null\n");
}
