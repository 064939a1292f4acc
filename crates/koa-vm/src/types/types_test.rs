// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the type-tag lattice.

use super::TypeTag;

#[test]
fn bigger_follows_tag_order() {
    assert_eq!(TypeTag::bigger(TypeTag::INT, TypeTag::DOUBLE), TypeTag::DOUBLE);
    assert_eq!(TypeTag::bigger(TypeTag::DOUBLE, TypeTag::INT), TypeTag::DOUBLE);
    assert_eq!(TypeTag::bigger(TypeTag::BOOL, TypeTag::CHAR), TypeTag::CHAR);
    // The fixed-width integers rank above the native-sized ones.
    assert_eq!(TypeTag::bigger(TypeTag::LONG, TypeTag::INT8), TypeTag::INT8);
    assert_eq!(TypeTag::bigger(TypeTag::UINT64, TypeTag::INT64), TypeTag::UINT64);
}

#[test]
fn classification() {
    assert!(TypeTag::BOOL.is_integer());
    assert!(TypeTag::CHAR.is_integer());
    assert!(TypeTag::UINT64.is_integer());
    assert!(!TypeTag::FLOAT.is_integer());
    assert!(TypeTag::FLOAT.is_floating());
    assert!(TypeTag::DOUBLE.is_numeric());
    assert!(!TypeTag::STR.is_numeric());
    assert!(!TypeTag::NULL.is_numeric());
}

#[test]
fn trackable_types() {
    assert!(TypeTag::VEC.is_trackable());
    assert!(TypeTag::DICT.is_trackable());
    assert!(TypeTag::struct_tag(0).is_trackable());
    assert!(TypeTag::union_tag(3).is_trackable());
    assert!(!TypeTag::INT.is_trackable());
    assert!(!TypeTag::STR.is_trackable());
    assert!(!TypeTag::FUNC.is_trackable());
}

#[test]
fn compound_tag_parity() {
    let s = TypeTag::struct_tag(2);
    let u = TypeTag::union_tag(2);
    assert!(s.is_struct());
    assert!(!s.is_union());
    assert!(u.is_union());
    assert!(!u.is_struct());
    assert_eq!(s.name(), "struct");
    assert_eq!(u.name(), "union");
}

#[test]
fn hashable_keys() {
    assert!(TypeTag::INT.is_hashable_key());
    assert!(TypeTag::DOUBLE.is_hashable_key());
    assert!(TypeTag::STR.is_hashable_key());
    assert!(!TypeTag::VEC.is_hashable_key());
    assert!(!TypeTag::NULL.is_hashable_key());
}
