// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the compiler's lowering.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{compile_source, compile_statement};
use crate::code::{Code, Op};
use crate::heap::Heap;
use crate::types::TypeTag;

fn ops(code: &Code) -> Vec<Op> {
    (0..code.current_pos())
        .filter_map(|i| code.get(i).map(|(op, _)| op))
        .collect()
}

#[test]
fn declaration_with_initializer() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "int x = 1;", "t.k").unwrap();
    assert_eq!(
        ops(&code),
        vec![Op::LoadConst, Op::StoreLocal, Op::EndProgram]
    );
    assert_eq!(code.varname(0).unwrap().ty, TypeTag::INT);
}

#[test]
fn declaration_without_initializer_defaults() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "dict d;", "t.k").unwrap();
    assert_eq!(ops(&code), vec![Op::StoreDef, Op::EndProgram]);
}

#[test]
fn expression_statement_pops_its_value() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "1 + 2;", "t.k").unwrap();
    assert_eq!(
        ops(&code),
        vec![
            Op::LoadConst,
            Op::LoadConst,
            Op::Add,
            Op::PopStack,
            Op::EndProgram
        ]
    );
}

#[test]
fn index_assignment_reorders_the_value_first() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "vec v; v[0] = 9;", "t.k").unwrap();
    // value, container, index, store
    assert_eq!(
        ops(&code),
        vec![
            Op::StoreDef,
            Op::LoadConst,
            Op::LoadVar,
            Op::LoadConst,
            Op::StoreIndex,
            Op::PopStack,
            Op::EndProgram
        ]
    );
}

#[test]
fn compound_var_assignment_uses_inplace_opcodes() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "int x = 1; x += 2;", "t.k").unwrap();
    assert!(ops(&code).contains(&Op::VarIpAdd));
    let code = compile_source(&mut heap, "int x = 1; x <<= 2;", "t.k").unwrap();
    assert!(ops(&code).contains(&Op::VarIpLs));
}

#[test]
fn blocks_emit_enter_and_leave() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "{ int x = 1; }", "t.k").unwrap();
    let emitted = ops(&code);
    assert_eq!(emitted.first(), Some(&Op::EnterBlock));
    assert!(emitted.contains(&Op::LeaveBlock));
}

#[test]
fn function_definition_creates_a_nested_code() {
    let mut heap = Heap::new();
    let code =
        compile_source(&mut heap, "int f(int n) { return n; }", "t.k").unwrap();
    assert_eq!(code.subs().len(), 1);
    let sub = &code.subs()[0];
    assert!(sub.is_func());
    assert_eq!(sub.name(), "f");
    assert_eq!(sub.arg_count(), 1);
    assert_eq!(sub.ret_type(), TypeTag::INT);
    // Entry binds the arguments.
    assert_eq!(sub.get(0), Some((Op::BindArgs, 1)));
    // The module stores the function object under its name.
    assert!(ops(&code).contains(&Op::StoreLocal));
}

#[test]
fn main_gets_called_automatically() {
    let mut heap = Heap::new();
    let code =
        compile_source(&mut heap, "int main() { return 0; }", "t.k").unwrap();
    let emitted = ops(&code);
    assert!(emitted.contains(&Op::CallFunc));
    assert_eq!(emitted.last(), Some(&Op::EndProgram));
}

#[test]
fn main_signature_is_checked() {
    let mut heap = Heap::new();
    assert!(compile_source(&mut heap, "void main() { }", "t.k").is_err());
    assert!(compile_source(&mut heap, "int main(int x) { return x; }", "t.k").is_err());
}

#[test]
fn switch_hoists_case_comparisons() {
    let mut heap = Heap::new();
    let src = "int x = 1; switch (x) { case 1: print(1); break; case 2: print(2); default: print(99); }";
    let code = compile_source(&mut heap, src, "t.k").unwrap();
    let emitted = ops(&code);

    // Both comparisons precede every call of the body.
    let first_case = emitted.iter().position(|&o| o == Op::JumpCase).unwrap();
    let last_case = emitted.iter().rposition(|&o| o == Op::JumpCase).unwrap();
    let first_call = emitted.iter().position(|&o| o == Op::CallFunc).unwrap();
    assert!(first_case < first_call);
    assert!(last_case < first_call);
    // Each comparison is chained past a forced jump into its body.
    assert_eq!(emitted[first_case + 1], Op::JumpForce);
    assert_eq!(emitted[last_case + 1], Op::JumpForce);
    assert!(emitted.contains(&Op::JumpDefault));
}

#[test]
fn break_counts_open_blocks() {
    let mut heap = Heap::new();
    let src = "while (1) { break; }";
    let code = compile_source(&mut heap, src, "t.k").unwrap();
    let emitted = ops(&code);
    let pop = emitted.iter().position(|&o| o == Op::PopBlocks).unwrap();
    // The loop block plus the body's compound block.
    let (_, n) = code.get(pop as u32).unwrap();
    assert_eq!(n, 2);
    assert_eq!(emitted[pop + 1], Op::JumpBreak);
}

#[test]
fn try_block_carries_its_handler_address() {
    let mut heap = Heap::new();
    let src = "try { print(1); } catch (exception e) { print(e); }";
    let code = compile_source(&mut heap, src, "t.k").unwrap();
    let (op, handler) = code.get(0).unwrap();
    assert_eq!(op, Op::EnterBlock);
    assert_ne!(handler, 0);
    // The handler starts with its own block and the exception binding.
    assert_eq!(code.get(handler).map(|(o, _)| o), Some(Op::EnterBlock));
    assert_eq!(code.get(handler + 1).map(|(o, _)| o), Some(Op::StoreException));
}

#[test]
fn struct_declaration_records_metadata() {
    let mut heap = Heap::new();
    let src = "struct Point { int x; int y; };";
    let code = compile_source(&mut heap, src, "t.k").unwrap();
    assert_eq!(code.struct_metas().len(), 1);
    let meta = &code.struct_metas()[0];
    assert_eq!(meta.name, "Point");
    assert_eq!(meta.fields.len(), 2);
    assert!(meta.tag.is_struct());

    let src = "union U { int i; double d; };";
    let code = compile_source(&mut heap, src, "t.k").unwrap();
    assert_eq!(code.union_metas().len(), 1);
    assert!(code.union_metas()[0].tag.is_union());
}

#[test]
fn syntax_errors_carry_the_location() {
    let mut heap = Heap::new();
    let err = compile_source(&mut heap, "int x = ;", "bad.k").unwrap_err();
    assert_eq!(err.path, "bad.k");
    assert_eq!(err.line, 1);

    let err = compile_source(&mut heap, "int x = 1\nint y = ;", "bad.k").unwrap_err();
    assert_eq!(err.line, 2);
}

#[test]
fn invalid_jump_statements_are_rejected() {
    let mut heap = Heap::new();
    assert!(compile_source(&mut heap, "break;", "t.k").is_err());
    assert!(compile_source(&mut heap, "continue;", "t.k").is_err());
    assert!(compile_source(&mut heap, "case 1: ;", "t.k").is_err());
    // continue binds loops only, never switch.
    assert!(
        compile_source(&mut heap, "int x; switch (x) { case 1: continue; }", "t.k").is_err()
    );
}

#[test]
fn return_type_mismatches_are_rejected() {
    let mut heap = Heap::new();
    assert!(compile_source(&mut heap, "void f() { return 1; }", "t.k").is_err());
    assert!(compile_source(&mut heap, "int f() { return; }", "t.k").is_err());
}

#[test]
fn repl_statement_rolls_back_on_error() {
    let mut heap = Heap::new();
    let mut code = Code::new("stdin", "#GLOBAL");
    compile_statement(&mut heap, &mut code, "int x = 1;").unwrap();
    let mark = code.current_pos();

    assert!(compile_statement(&mut heap, &mut code, "int y = ;").is_err());
    assert_eq!(code.current_pos(), mark);

    // The next statement compiles cleanly on the recovered code.
    compile_statement(&mut heap, &mut code, "print(x)").unwrap();
    assert!(code.current_pos() > mark);
}

#[test]
fn cast_expression_compiles() {
    let mut heap = Heap::new();
    let code = compile_source(&mut heap, "print((long) 3);", "t.k").unwrap();
    let emitted = ops(&code);
    let cast = emitted.iter().position(|&o| o == Op::TypeCast).unwrap();
    let (_, para) = code.get(cast as u32).unwrap();
    assert_eq!(para as i32, TypeTag::LONG.0);
}
