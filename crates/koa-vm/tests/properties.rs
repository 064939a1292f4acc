// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Property tests over the object model and the code round trip.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::rc::Rc;

use proptest::prelude::*;

use koa_vm::code::binary::{read_code, write_code, ByteReader};
use koa_vm::compiler;
use koa_vm::heap::Heap;
use koa_vm::interp::Interp;
use koa_vm::object::{self, vecobj, Num};
use koa_vm::types::TypeTag;

proptest! {
    /// Numerically equal values digest and compare equal across types.
    #[test]
    fn equal_numbers_share_digest_and_equality(v in any::<i32>()) {
        let mut heap = Heap::new();
        let i = heap.int_obj(v);
        let l = heap.long_obj(i64::from(v));
        let d = heap.double_obj(f64::from(v));
        prop_assert_eq!(object::digest(&heap, i), object::digest(&heap, d));
        prop_assert_eq!(object::digest(&heap, i), object::digest(&heap, l));
        prop_assert!(object::value_eq(i, d).unwrap());
        prop_assert!(object::value_eq(i, l).unwrap());
    }

    /// Cycles of any length vanish once unreferenced.
    #[test]
    fn cycles_of_any_length_are_collected(n in 1usize..24) {
        let mut heap = Heap::new();
        let nodes: Vec<_> = (0..n).map(|_| heap.vec_obj(Vec::new())).collect();
        for i in 0..n {
            vecobj::push(nodes[i], nodes[(i + 1) % n]);
        }
        prop_assert_eq!(heap.gc.tracked_count(), n);
        koa_vm::gc::collect_all(&mut heap);
        prop_assert_eq!(heap.gc.tracked_count(), 0);
    }

    /// Short strings intern to one identity; long strings never do.
    #[test]
    fn interning_identity(s in proptest::collection::vec(any::<u8>(), 0..=5)) {
        let mut heap = Heap::new();
        let a = heap.str_obj(&s);
        let b = heap.str_obj(&s);
        prop_assert_eq!(a, b);
    }

    /// Binary operations on differing numeric types produce the
    /// bigger tag.
    #[test]
    fn binop_result_type_is_the_bigger_tag(
        a_tag in 0x02i32..=0x0f,
        b_tag in 0x02i32..=0x0f,
        a_val in 0i64..=100,
        b_val in 1i64..=100,
    ) {
        prop_assume!(a_tag != b_tag);
        let mut heap = Heap::new();
        let ta = TypeTag(a_tag);
        let tb = TypeTag(b_tag);
        let a = heap.num_obj(ta, Num::Int(a_val));
        let b = heap.num_obj(tb, Num::Int(b_val));
        let r = object::add(&mut heap, a, b).unwrap();
        prop_assert_eq!(r.tag(), TypeTag::bigger(ta, tb));
        let r = object::mul(&mut heap, a, b).unwrap();
        prop_assert_eq!(r.tag(), TypeTag::bigger(ta, tb));
    }

    /// Compiled code survives its own binary serialization: the
    /// reloaded module produces identical output.
    #[test]
    fn code_binary_round_trip(a in -1000i32..=1000, b in 1i32..=1000) {
        let src = format!(
            "int x = {a}; int y = {b}; print(x + y); print(x * y); print(x / y); \
             if (x > y) {{ print(1); }} else {{ print(0); }}"
        );

        let (mut interp, out) = Interp::with_captured_output();
        let code = compiler::compile_source(&mut interp.heap, &src, "p.k").unwrap();

        let mut image = Vec::new();
        write_code(&code, &mut image);

        let status = interp.execute_module(Rc::new(code));
        prop_assert_eq!(status, 0);
        let direct = out.text();

        let (mut interp2, out2) = Interp::with_captured_output();
        let mut reader = ByteReader::new(&image);
        let reloaded = read_code(&mut interp2.heap, &mut reader).unwrap();
        let status = interp2.execute_module(Rc::new(reloaded));
        prop_assert_eq!(status, 0);
        prop_assert_eq!(out2.text(), direct);
    }

    /// Programs that only build and drop containers leave nothing
    /// tracked behind.
    #[test]
    fn container_churn_leaves_no_tracked_objects(n in 1usize..16) {
        let src = format!(
            "for (int i = 0; i < {n}; i++) {{ vec a; vec b; a[0] = b; b[0] = a; }}"
        );
        let (mut interp, _out) = Interp::with_captured_output();
        let code = compiler::compile_source(&mut interp.heap, &src, "p.k").unwrap();
        prop_assert_eq!(interp.execute_module(Rc::new(code)), 0);
        prop_assert_eq!(interp.heap.gc.tracked_count(), 0);
    }
}
