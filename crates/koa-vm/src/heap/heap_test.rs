// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the object heap.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Heap, INT_CACHE_MAX, INT_CACHE_MIN};
use crate::object::{self, Num};
use crate::types::TypeTag;

#[test]
fn singletons_are_shared() {
    let heap = Heap::new();
    assert_eq!(heap.null_obj(), heap.null_obj());
    assert_eq!(heap.bool_obj(true), heap.bool_obj(true));
    assert_eq!(heap.bool_obj(false), heap.bool_obj(false));
    assert_ne!(heap.bool_obj(true), heap.bool_obj(false));
    assert!(heap.null_obj().is_immortal());
    assert!(heap.void_obj().is_void());
}

#[test]
fn small_ints_are_cached() {
    let mut heap = Heap::new();
    assert_eq!(heap.int_obj(42), heap.int_obj(42));
    assert_eq!(heap.int_obj(INT_CACHE_MIN), heap.int_obj(INT_CACHE_MIN));
    assert_eq!(heap.int_obj(INT_CACHE_MAX), heap.int_obj(INT_CACHE_MAX));
    // Outside the window every construction is distinct.
    assert_ne!(heap.int_obj(20000), heap.int_obj(20000));
}

#[test]
fn chars_are_cached() {
    let mut heap = Heap::new();
    assert_eq!(heap.char_obj(b'a'), heap.char_obj(b'a'));
    assert_eq!(heap.char_obj(0), heap.char_obj(0));
    assert_eq!(heap.char_obj(255), heap.char_obj(255));
}

#[test]
fn short_strings_intern() {
    let mut heap = Heap::new();
    let a = heap.str_obj(b"ab");
    let b = heap.str_obj(b"ab");
    assert_eq!(a, b);
    // Five bytes is the interning limit.
    assert_eq!(heap.str_obj(b"12345"), heap.str_obj(b"12345"));
    assert_ne!(heap.str_obj(b"123456"), heap.str_obj(b"123456"));
}

#[test]
fn num_obj_truncates_like_a_cast() {
    let mut heap = Heap::new();
    let v = heap.num_obj(TypeTag::UINT8, Num::Int(300));
    assert_eq!(object::get_integer(v), 44);
    let v = heap.num_obj(TypeTag::INT8, Num::Int(200));
    assert_eq!(object::get_integer(v), -56);
    let v = heap.num_obj(TypeTag::INT, Num::Float(3.9));
    assert_eq!(object::get_integer(v), 3);
    let v = heap.num_obj(TypeTag::BOOL, Num::Int(7));
    assert_eq!(v, heap.bool_obj(true));
}

#[test]
fn default_objects() {
    let mut heap = Heap::new();
    let d = heap.default_obj(TypeTag::INT, None).unwrap();
    assert_eq!(object::get_integer(d), 0);
    let d = heap.default_obj(TypeTag::STR, None).unwrap();
    assert_eq!(object::strobj::bytes(d), b"");
    let d = heap.default_obj(TypeTag::VEC, None).unwrap();
    assert_eq!(object::vecobj::len(d), 0);
    let d = heap.default_obj(TypeTag::DICT, None).unwrap();
    assert_eq!(d.tag(), TypeTag::DICT);
    // Compounds need metadata.
    assert!(heap.default_obj(TypeTag::struct_tag(0), None).is_err());
}

#[test]
fn containers_register_with_the_collector() {
    let mut heap = Heap::new();
    assert_eq!(heap.gc.tracked_count(), 0);
    let v = heap.vec_obj(Vec::new());
    let d = heap.dict_obj();
    assert_eq!(heap.gc.tracked_count(), 2);
    heap.discard(v);
    heap.discard(d);
    assert_eq!(heap.gc.tracked_count(), 0);
}

#[test]
fn refcount_keeps_objects_alive() {
    let mut heap = Heap::new();
    let v = heap.vec_obj(Vec::new());
    v.inc_ref();
    v.inc_ref();
    assert_eq!(v.refcnt(), 2);
    heap.unref(v);
    assert_eq!(v.refcnt(), 1);
    assert_eq!(heap.gc.tracked_count(), 1);
    heap.unref(v);
    assert_eq!(heap.gc.tracked_count(), 0);
}

#[test]
fn vec_elements_released_with_their_vec() {
    let mut heap = Heap::new();
    let inner = heap.vec_obj(Vec::new());
    inner.inc_ref();
    let outer = heap.vec_obj(vec![inner]);
    outer.inc_ref();
    assert_eq!(heap.gc.tracked_count(), 2);
    heap.unref(outer);
    assert_eq!(heap.gc.tracked_count(), 0);
}
