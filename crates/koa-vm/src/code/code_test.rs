// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for code units and the bytecode binary format.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::rc::Rc;

use super::binary::{read_code, write_code, ByteReader};
use super::{pack, unpack_op, unpack_para, Code, CompoundMeta, Op, MAX_PARA};
use crate::heap::Heap;
use crate::object;
use crate::types::TypeTag;

#[test]
fn opcode_packing() {
    let word = pack(Op::LoadConst, 0x123456);
    assert_eq!(unpack_op(word), Some(Op::LoadConst));
    assert_eq!(unpack_para(word), 0x123456);

    let word = pack(Op::EndProgram, MAX_PARA);
    assert_eq!(unpack_op(word), Some(Op::EndProgram));
    assert_eq!(unpack_para(word), MAX_PARA);

    assert_eq!(unpack_op(0xff00_0000), None);
}

#[test]
fn push_and_patch_opcodes() {
    let mut code = Code::new("test.k", "#GLOBAL");
    let p0 = code.push_opcode(Op::LoadConst, 0, 1);
    let p1 = code.push_opcode(Op::JumpFalse, 0, 1);
    assert_eq!((p0, p1), (0, 1));
    assert_eq!(code.current_pos(), 2);

    code.modify_opcode(p1, Op::JumpFalse, 7);
    assert_eq!(code.get(p1), Some((Op::JumpFalse, 7)));
    assert_eq!(code.last_opcode(), Some((Op::JumpFalse, 7)));
    assert_eq!(code.get_line(p0), 1);
}

#[test]
fn const_pool_dedups_scalars_and_strings() {
    let mut heap = Heap::new();
    let mut code = Code::new("test.k", "#GLOBAL");

    let a = heap.int_obj(42);
    let (i0, existed) = code.push_const(&mut heap, a);
    assert!(!existed);
    let b = heap.int_obj(42);
    let (i1, existed) = code.push_const(&mut heap, b);
    assert!(existed);
    assert_eq!(i0, i1);

    let s1 = heap.str_obj(b"hello world");
    let s2 = heap.str_obj(b"hello world");
    let (j0, _) = code.push_const(&mut heap, s1);
    let (j1, existed) = code.push_const(&mut heap, s2);
    assert!(existed);
    assert_eq!(j0, j1);

    // Distinct values stay distinct.
    let c = heap.int_obj(43);
    let (i2, existed) = code.push_const(&mut heap, c);
    assert!(!existed);
    assert_ne!(i0, i2);
}

#[test]
fn varname_table() {
    let mut code = Code::new("test.k", "f");
    let a = code.declare_var("a", TypeTag::INT, true);
    let b = code.declare_var("b", TypeTag::STR, false);
    assert_ne!(a, b);
    assert_eq!(code.arg_count(), 1);

    // A use site finds the declaration.
    assert_eq!(code.var_index("a"), a);
    // Unknown names get a wildcard entry.
    let c = code.var_index("print");
    assert_eq!(code.varname(c).unwrap().ty, TypeTag::ALL);
}

#[test]
fn rotate_tail_moves_the_value_first() {
    let mut code = Code::new("test.k", "#GLOBAL");
    code.push_opcode(Op::LoadVar, 0, 1);
    code.push_opcode(Op::LoadConst, 1, 1);
    code.push_opcode(Op::LoadConst, 2, 1);
    // target = [LoadVar 0, LoadConst 1], value = [LoadConst 2]
    code.rotate_tail(0, 2);
    assert_eq!(code.get(0), Some((Op::LoadConst, 2)));
    assert_eq!(code.get(1), Some((Op::LoadVar, 0)));
    assert_eq!(code.get(2), Some((Op::LoadConst, 1)));
}

#[test]
fn binary_roundtrip() {
    let mut heap = Heap::new();
    let mut code = Code::new("test.k", "#GLOBAL");
    let forty_two = heap.int_obj(42);
    let (ci, _) = code.push_const(&mut heap, forty_two);
    let msg = heap.str_obj(b"some long message");
    let (si, _) = code.push_const(&mut heap, msg);
    code.declare_var("x", TypeTag::INT, false);
    code.push_opcode(Op::LoadConst, ci, 3);
    code.push_opcode(Op::LoadConst, si, 4);
    code.push_opcode(Op::StoreLocal, 0, 4);
    code.push_opcode(Op::EndProgram, 0, 5);
    code.push_meta(Rc::new(CompoundMeta {
        tag: TypeTag::struct_tag(0),
        name: "Point".to_string(),
        fields: vec![
            ("x".to_string(), TypeTag::INT),
            ("y".to_string(), TypeTag::INT),
        ],
    }));

    let mut sub = Code::new("test.k", "f");
    sub.set_func(7, TypeTag::INT);
    sub.declare_var("n", TypeTag::INT, true);
    sub.push_opcode(Op::BindArgs, 1, 7);
    sub.push_opcode(Op::Return, 0, 8);
    code.push_sub(Rc::new(sub));

    let mut image = Vec::new();
    write_code(&code, &mut image);
    let mut reader = ByteReader::new(&image);
    let loaded = read_code(&mut heap, &mut reader).unwrap();

    assert_eq!(loaded.name(), "#GLOBAL");
    assert_eq!(loaded.filename(), "test.k");
    assert_eq!(loaded.current_pos(), code.current_pos());
    assert_eq!(loaded.get(0), Some((Op::LoadConst, ci)));
    assert_eq!(loaded.get_line(1), 4);
    assert_eq!(
        object::get_integer(loaded.get_const(ci).unwrap()),
        42
    );
    assert_eq!(
        object::strobj::bytes(loaded.get_const(si).unwrap()),
        b"some long message"
    );
    assert_eq!(loaded.varname(0).unwrap().name, "x");

    let meta = loaded.find_compound(TypeTag::struct_tag(0)).unwrap();
    assert_eq!(meta.name, "Point");
    assert_eq!(meta.fields.len(), 2);

    assert_eq!(loaded.subs().len(), 1);
    let sub = &loaded.subs()[0];
    assert!(sub.is_func());
    assert_eq!(sub.ret_type(), TypeTag::INT);
    assert_eq!(sub.arg_count(), 1);
    assert_eq!(sub.first_line(), 7);
}

#[test]
fn truncate_supports_repl_rollback() {
    let mut code = Code::new("stdin", "#GLOBAL");
    code.push_opcode(Op::LoadConst, 0, 1);
    let mark = code.current_pos();
    code.push_opcode(Op::PopStack, 0, 2);
    code.push_opcode(Op::PopStack, 0, 2);
    code.truncate_to(mark);
    assert_eq!(code.current_pos(), mark);
    assert_eq!(code.last_opcode(), Some((Op::LoadConst, 0)));
}

#[test]
fn disassembly_lists_opcodes_and_consts() {
    let mut heap = Heap::new();
    let mut code = Code::new("test.k", "#GLOBAL");
    let obj = heap.int_obj(5);
    let (ci, _) = code.push_const(&mut heap, obj);
    code.push_opcode(Op::LoadConst, ci, 1);
    code.push_opcode(Op::EndProgram, 0, 1);
    let listing = code.disassemble();
    assert!(listing.contains("LOAD_CONST"));
    assert!(listing.contains("END_PROGRAM"));
    assert!(listing.contains("<int 5>"));
}
