// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for frames and blocks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::rc::Rc;

use super::Frame;
use crate::code::Code;
use crate::heap::Heap;
use crate::object;
use crate::types::TypeTag;

fn test_frame() -> Frame {
    Frame::new(Rc::new(Code::new("test.k", "#GLOBAL")), 0, true, false)
}

#[test]
fn locals_live_in_the_innermost_block() {
    let mut heap = Heap::new();
    let mut frame = test_frame();
    let one = heap.int_obj(1);
    frame.store_local("x", one).unwrap();
    assert_eq!(frame.get_var("x"), Some(one));
    assert_eq!(frame.get_var("y"), None);
}

#[test]
fn redefinition_in_one_block_is_an_error() {
    let mut heap = Heap::new();
    let mut frame = test_frame();
    let one = heap.int_obj(1);
    frame.store_local("x", one).unwrap();
    let two = heap.int_obj(2);
    assert!(frame.store_local("x", two).is_err());
}

#[test]
fn nested_blocks_shadow_and_unwind() {
    let mut heap = Heap::new();
    let mut frame = test_frame();
    let outer = heap.int_obj(1);
    frame.store_local("x", outer).unwrap();

    frame.enter_block(0, 0, false);
    let inner = heap.int_obj(2);
    frame.store_local("x", inner).unwrap();
    assert_eq!(frame.get_var("x"), Some(inner));

    frame.leave_block(&mut heap).unwrap();
    assert_eq!(frame.get_var("x"), Some(outer));
}

#[test]
fn store_var_casts_to_the_existing_type() {
    let mut heap = Heap::new();
    let mut frame = test_frame();
    let n = heap.int_obj(1);
    frame.store_local("x", n).unwrap();

    let d = heap.double_obj(2.9);
    let prev = frame.store_var(&mut heap, "x", d).unwrap().unwrap();
    assert_eq!(prev, n);
    heap.unref(prev);
    heap.discard(d);

    let stored = frame.get_var("x").unwrap();
    assert_eq!(stored.tag(), TypeTag::INT);
    assert_eq!(object::get_integer(stored), 2);
}

#[test]
fn store_var_misses_unknown_names() {
    let mut heap = Heap::new();
    let mut frame = test_frame();
    let n = heap.int_obj(1);
    assert!(frame.store_var(&mut heap, "nope", n).unwrap().is_none());
}

#[test]
fn recover_unwinds_to_the_catching_block() {
    let mut heap = Heap::new();
    let mut frame = test_frame();
    frame.enter_block(9, 3, true);
    frame.enter_block(0, 5, false);
    frame.enter_block(0, 7, false);
    assert!(frame.is_catched());

    let (bottom, out) = frame.recover(&mut heap).unwrap();
    assert_eq!(bottom, 3);
    assert_eq!(out, 9);
    // The catching block is consumed.
    assert!(!frame.is_catched());
    assert_eq!(frame.blocks.len(), 1);
    assert!(frame.recover(&mut heap).is_none());
}

#[test]
fn bind_args_checks_arity_and_casts() {
    let mut heap = Heap::new();
    let mut code = Code::new("test.k", "f");
    code.declare_var("a", TypeTag::INT, true);
    code.declare_var("b", TypeTag::DOUBLE, true);
    code.set_func(1, TypeTag::INT);
    let mut frame = Frame::new(Rc::new(code), 0, false, false);

    let x = heap.int_obj(1);
    x.inc_ref();
    let y = heap.int_obj(2);
    y.inc_ref();
    let args = heap.vec_obj(vec![x, y]);
    frame.bind_args(&mut heap, args).unwrap();

    assert_eq!(object::get_integer(frame.get_var("a").unwrap()), 1);
    let b = frame.get_var("b").unwrap();
    assert_eq!(b.tag(), TypeTag::DOUBLE);
    assert_eq!(object::get_floating(b), 2.0);

    // Arity mismatch fails.
    let lone = heap.int_obj(1);
    lone.inc_ref();
    let short = heap.vec_obj(vec![lone]);
    let mut fresh = Frame::new(frame.code.clone(), 0, false, false);
    assert!(fresh.bind_args(&mut heap, short).is_err());
}
