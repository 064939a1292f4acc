// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the polymorphic operations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::types::TypeTag;

#[test]
fn add_promotes_to_the_bigger_type() {
    let mut heap = Heap::new();
    let i = heap.int_obj(3);
    let d = heap.double_obj(1.5);
    let r = add(&mut heap, i, d).unwrap();
    assert_eq!(r.tag(), TypeTag::DOUBLE);
    assert_eq!(get_floating(r), 4.5);

    // Equal types below INT widen to INT.
    let a = heap.char_obj(10);
    let b = heap.char_obj(20);
    let r = add(&mut heap, a, b).unwrap();
    assert_eq!(r.tag(), TypeTag::INT);
    assert_eq!(get_integer(r), 30);

    // Differing types take the larger tag, even across signedness.
    let a = heap.long_obj(1);
    let b = heap.num_obj(TypeTag::UINT64, Num::Uint(2));
    let r = add(&mut heap, a, b).unwrap();
    assert_eq!(r.tag(), TypeTag::UINT64);
}

#[test]
fn integer_arithmetic_wraps() {
    let mut heap = Heap::new();
    let a = heap.int_obj(i32::MAX);
    let b = heap.int_obj(1);
    let r = add(&mut heap, a, b).unwrap();
    assert_eq!(get_integer(r), i64::from(i32::MIN));

    let a = heap.num_obj(TypeTag::UINT8, Num::Int(250));
    let b = heap.num_obj(TypeTag::UINT8, Num::Int(10));
    let r = add(&mut heap, a, b).unwrap();
    assert_eq!(r.tag(), TypeTag::UINT8);
    assert_eq!(get_integer(r), 4);
}

#[test]
fn division_by_zero_raises() {
    let mut heap = Heap::new();
    let a = heap.int_obj(1);
    let b = heap.int_obj(0);
    assert_eq!(div(&mut heap, a, b), Err(RuntimeError::ZeroDivision));
    assert_eq!(rem(&mut heap, a, b), Err(RuntimeError::ZeroDivision));
    let ok = div(&mut heap, b, a).unwrap();
    assert_eq!(get_integer(ok), 0);
}

#[test]
fn shifts_widen_the_left_operand() {
    let mut heap = Heap::new();
    let c = heap.char_obj(1);
    let by = heap.int_obj(4);
    let r = left_shift(&mut heap, c, by).unwrap();
    assert_eq!(r.tag(), TypeTag::INT);
    assert_eq!(get_integer(r), 16);

    let v = heap.int_obj(-8);
    let r = right_shift(&mut heap, v, by).unwrap();
    // Arithmetic shift for signed operands.
    assert_eq!(get_integer(r), -1);
}

#[test]
fn equality_rules() {
    let mut heap = Heap::new();
    let null = heap.null_obj();
    let x = heap.int_obj(1);
    assert!(value_eq(null, null).unwrap());
    assert!(!value_eq(null, x).unwrap());
    assert!(!value_eq(x, null).unwrap());

    // Numeric equality crosses types.
    let i = heap.int_obj(3);
    let d = heap.double_obj(3.0);
    assert!(value_eq(i, d).unwrap());

    let a = heap.str_obj(b"abcdef");
    let b = heap.str_obj(b"abcdef");
    assert_ne!(a, b);
    assert!(value_eq(a, b).unwrap());

    // Mixed non-numeric pairs report an error.
    assert!(value_eq(a, i).is_err());
}

#[test]
fn comparison_returns_sign() {
    let mut heap = Heap::new();
    let a = heap.int_obj(1);
    let b = heap.double_obj(2.0);
    let r = compare(&mut heap, a, b).unwrap();
    assert_eq!(get_integer(r), -1);
    let r = compare(&mut heap, b, a).unwrap();
    assert_eq!(get_integer(r), 1);
    let s1 = heap.str_obj(b"abc");
    let s2 = heap.str_obj(b"abd");
    let r = compare(&mut heap, s1, s2).unwrap();
    assert_eq!(get_integer(r), -1);
    let v = heap.vec_obj(Vec::new());
    assert!(compare(&mut heap, v, a).is_err());
}

#[test]
fn digest_is_memoized_and_type_blind_for_numbers() {
    let mut heap = Heap::new();
    let i = heap.int_obj(3);
    let d = heap.double_obj(3.0);
    let l = heap.long_obj(3);
    assert_eq!(digest(&heap, i), digest(&heap, d));
    assert_eq!(digest(&heap, i), digest(&heap, l));
    let first = digest(&heap, i);
    assert_eq!(digest(&heap, i), first);

    // Non-integral floats hash by bit pattern, not by value class.
    let f = heap.double_obj(3.5);
    assert_ne!(digest(&heap, f), digest(&heap, i));

    // Containers hash by address.
    let v1 = heap.vec_obj(Vec::new());
    let v2 = heap.vec_obj(Vec::new());
    assert_ne!(digest(&heap, v1), digest(&heap, v2));
}

#[test]
fn float_digest_special_values() {
    let heap = Heap::new();
    let _ = &heap;
    assert_eq!(floating_hash(f64::NAN), integer_hash(0));
    assert_eq!(floating_hash(f64::INFINITY), integer_hash(314_159));
    assert_eq!(floating_hash(f64::NEG_INFINITY), integer_hash(-271_828));
    assert_eq!(floating_hash(7.0), integer_hash(7));
}

#[test]
fn cast_is_numeric_only() {
    let mut heap = Heap::new();
    let d = heap.double_obj(3.7);
    let i = cast(&mut heap, d, TypeTag::INT).unwrap();
    assert_eq!(get_integer(i), 3);
    let s = heap.str_obj(b"x");
    assert!(cast(&mut heap, s, TypeTag::INT).is_err());
    assert!(cast(&mut heap, d, TypeTag::STR).is_err());
    // Identical type passes through.
    assert_eq!(cast(&mut heap, d, TypeTag::DOUBLE).unwrap(), d);
}

#[test]
fn str_operations() {
    let mut heap = Heap::new();
    let a = heap.str_obj(b"hello ");
    let b = heap.str_obj(b"world");
    let joined = strobj::concat(&mut heap, a, b).unwrap();
    assert_eq!(strobj::bytes(joined), b"hello world");

    let pos = heap.int_obj(1);
    let c = strobj::index(&mut heap, joined, pos).unwrap();
    assert_eq!(c.tag(), TypeTag::CHAR);
    assert_eq!(get_integer(c), i64::from(b'e'));

    let far = heap.int_obj(100);
    assert!(matches!(
        strobj::index(&mut heap, joined, far),
        Err(RuntimeError::Index(_))
    ));

    let n = len(&mut heap, joined).unwrap();
    assert_eq!(get_integer(n), 11);
}

#[test]
fn vec_ipindex_appends_at_the_end() {
    let mut heap = Heap::new();
    let v = heap.vec_obj(Vec::new());
    let zero = heap.int_obj(0);
    let one = heap.int_obj(1);
    let x = heap.str_obj(b"abcdef");

    // Writing position 0 of an empty vec appends.
    ipindex(&mut heap, v, zero, x).unwrap();
    assert_eq!(vecobj::len(v), 1);
    assert_eq!(x.refcnt(), 1);

    // In-bounds write replaces and releases the old element.
    let y = heap.str_obj(b"ghijkl");
    ipindex(&mut heap, v, zero, y).unwrap();
    assert_eq!(vecobj::len(v), 1);
    assert_eq!(y.refcnt(), 1);

    // Far out of bounds still fails.
    let far = heap.int_obj(5);
    assert!(matches!(
        ipindex(&mut heap, v, far, one),
        Err(RuntimeError::Index(_))
    ));
}

#[test]
fn dict_semantics() {
    let mut heap = Heap::new();
    let d = heap.dict_obj();
    let k = heap.str_obj(b"k");
    let v = heap.int_obj(42);

    // Absent key reads null, never an error.
    let missing = index(&mut heap, d, k).unwrap();
    assert!(missing.is_null());

    ipindex(&mut heap, d, k, v).unwrap();
    let got = index(&mut heap, d, k).unwrap();
    assert_eq!(get_integer(got), 42);

    // Integer and float keys with equal value collide.
    let ik = heap.int_obj(3);
    let fk = heap.double_obj(3.0);
    let marker = heap.int_obj(7);
    ipindex(&mut heap, d, ik, marker).unwrap();
    let got = index(&mut heap, d, fk).unwrap();
    assert_eq!(get_integer(got), 7);

    // Unhashable keys are an error.
    let vk = heap.vec_obj(Vec::new());
    assert!(matches!(
        index(&mut heap, d, vk),
        Err(RuntimeError::Key(_))
    ));
    heap.discard(vk);

    let n = len(&mut heap, d).unwrap();
    assert_eq!(get_integer(n), 2);
}

#[test]
fn dict_grows_and_shrinks() {
    let mut heap = Heap::new();
    let d = heap.dict_obj();
    for i in 0..100 {
        let k = heap.int_obj(i);
        let v = heap.int_obj(i * 2);
        ipindex(&mut heap, d, k, v).unwrap();
    }
    for i in 0..100 {
        let k = heap.int_obj(i);
        let got = index(&mut heap, d, k).unwrap();
        assert_eq!(get_integer(got), i64::from(i) * 2);
    }
    for i in 0..100 {
        let k = heap.int_obj(i);
        assert!(dictobj::remove(&mut heap, d, k).unwrap());
    }
    let n = len(&mut heap, d).unwrap();
    assert_eq!(get_integer(n), 0);
}

#[test]
fn logic_ops() {
    let mut heap = Heap::new();
    let t = heap.int_obj(2);
    let f = heap.int_obj(0);
    let r = logic_and(&mut heap, t, f).unwrap();
    assert_eq!(r, heap.bool_obj(false));
    let r = logic_or(&mut heap, t, f).unwrap();
    assert_eq!(r, heap.bool_obj(true));
    let r = logic_not(&mut heap, f).unwrap();
    assert_eq!(r, heap.bool_obj(true));
    let s = heap.str_obj(b"abcdef");
    assert!(logic_and(&mut heap, s, t).is_err());
}

#[test]
fn neg_and_bit_not() {
    let mut heap = Heap::new();
    let b = heap.bool_obj(true);
    let r = neg(&mut heap, b).unwrap();
    assert_eq!(r.tag(), TypeTag::INT);
    assert_eq!(get_integer(r), -1);
    let x = heap.int_obj(0);
    let r = bit_not(&mut heap, x).unwrap();
    assert_eq!(get_integer(r), -1);
}

#[test]
fn print_forms() {
    let mut heap = Heap::new();
    assert_eq!(print_str(heap.int_obj(3)), "3");
    assert_eq!(print_str(heap.null_obj()), "null");
    assert_eq!(print_str(heap.bool_obj(true)), "true");
    assert_eq!(print_str(heap.str_obj(b"hi")), "\"hi\"");
    let e = heap.exception_obj("division by zero.");
    assert_eq!(print_str(e), "<exception \"division by zero.\">");
    let one = heap.int_obj(1);
    one.inc_ref();
    let v = heap.vec_obj(vec![one]);
    assert_eq!(print_str(v), "[1]");
}

#[test]
fn binary_roundtrip_scalars_and_containers() {
    let mut heap = Heap::new();
    let d = heap.dict_obj();
    let k = heap.str_obj(b"n");
    let v = heap.double_obj(2.5);
    ipindex(&mut heap, d, k, v).unwrap();
    let one = heap.int_obj(1);
    one.inc_ref();
    d.inc_ref();
    let vec = heap.vec_obj(vec![one, d]);

    let bytes = binary::to_bytes(vec);
    let mut reader = crate::code::binary::ByteReader::new(&bytes);
    let back = binary::read_obj(&mut heap, &mut reader, None).unwrap();

    assert_eq!(back.tag(), TypeTag::VEC);
    assert_eq!(vecobj::len(back), 2);
    let e0 = vecobj::get(back, 0).unwrap();
    assert_eq!(get_integer(e0), 1);
    let e1 = vecobj::get(back, 1).unwrap();
    assert_eq!(e1.tag(), TypeTag::DICT);
    let got = index(&mut heap, e1, k).unwrap();
    assert_eq!(get_floating(got), 2.5);
}

#[test]
fn deep_copy_preserves_shape_and_shares_nothing() {
    let mut src = Heap::new();
    let mut dst = Heap::new();

    let s = src.str_obj(b"shared");
    s.inc_ref();
    s.inc_ref();
    let v = src.vec_obj(vec![s, s]);

    let copied = copy::deep_copy(&mut dst, v).unwrap();
    assert_eq!(copied.tag(), TypeTag::VEC);
    let a = vecobj::get(copied, 0).unwrap();
    let b = vecobj::get(copied, 1).unwrap();
    // Shared structure stays shared inside the copy...
    assert_eq!(a, b);
    // ...but nothing aliases the source heap.
    assert_ne!(a, s);
    assert_eq!(strobj::bytes(a), b"shared");
}

#[test]
fn deep_copy_handles_cycles() {
    let mut src = Heap::new();
    let mut dst = Heap::new();

    let a = src.vec_obj(Vec::new());
    let b = src.vec_obj(Vec::new());
    vecobj::push(a, b);
    vecobj::push(b, a);

    let ca = copy::deep_copy(&mut dst, a).unwrap();
    let cb = vecobj::get(ca, 0).unwrap();
    let back = vecobj::get(cb, 0).unwrap();
    assert_eq!(back, ca);
}
