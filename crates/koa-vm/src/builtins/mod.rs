// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Builtin function slots.
//!
//! Builtins occupy a fixed, 1-based slot table; FUNC serialization
//! refers to a builtin by its slot id, never its name. An undefined
//! identifier resolves against this table as a last resort, so builtin
//! names behave like globals without occupying any namespace.


use crate::error::RuntimeError;
use crate::interp::Interp;
use crate::object::{self, vecobj, ObjRef};
use crate::thread;
use crate::types::TypeTag;

/// Descriptor of one builtin slot.
pub struct Slot {
    /// 1-based stable id.
    pub id: u32,
    pub name: &'static str,
    /// Accepts any number of arguments at or above `args`.
    pub var_args: bool,
    /// Fixed argument count (minimum for varargs).
    pub args: usize,
    /// Declared type per fixed argument; ALL accepts anything.
    pub arg_types: &'static [TypeTag],
}

/// The slot table. Order is the on-disk contract.
pub static SLOTS: &[Slot] = &[
    Slot { id: 1, name: "print", var_args: false, args: 1, arg_types: &[TypeTag::ALL] },
    Slot { id: 2, name: "hash", var_args: false, args: 1, arg_types: &[TypeTag::ALL] },
    Slot { id: 3, name: "len", var_args: false, args: 1, arg_types: &[TypeTag::ALL] },
    Slot { id: 4, name: "append", var_args: true, args: 2, arg_types: &[TypeTag::VEC, TypeTag::ALL] },
    Slot { id: 5, name: "remove", var_args: false, args: 2, arg_types: &[TypeTag::ALL, TypeTag::ALL] },
    Slot { id: 6, name: "exit", var_args: false, args: 1, arg_types: &[TypeTag::ALL] },
    Slot { id: 7, name: "spawn", var_args: true, args: 1, arg_types: &[TypeTag::FUNC] },
    Slot { id: 8, name: "join", var_args: false, args: 1, arg_types: &[TypeTag::LONG] },
    Slot { id: 9, name: "cancel", var_args: false, args: 1, arg_types: &[TypeTag::LONG] },
];

/// Look a builtin up by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static Slot> {
    SLOTS.iter().find(|s| s.name == name)
}

/// Look a builtin up by slot id.
#[must_use]
pub fn by_id(id: u32) -> Option<&'static Slot> {
    SLOTS.iter().find(|s| s.id == id)
}

/// Whether the slot takes no arguments at all.
#[must_use]
pub fn no_arg(id: u32) -> bool {
    by_id(id).is_some_and(|s| !s.var_args && s.args == 0)
}

/// Execute a builtin over its argument vector. Returns the result
/// object; value-less builtins return the VOID dummy.
pub fn execute(interp: &mut Interp, id: u32, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let Some(slot) = by_id(id) else {
        return Err(RuntimeError::Argument(format!("unknown builtin slot {id}.")));
    };

    let argc = vecobj::len(args);
    if slot.var_args {
        if argc < slot.args {
            return Err(RuntimeError::Argument(format!(
                "builtin {} requires at least {} arguments, passed: {argc}.",
                slot.name, slot.args
            )));
        }
    } else if argc != slot.args {
        return Err(RuntimeError::Argument(format!(
            "wrong number of arguments, required: {}, passed: {argc}.",
            slot.args
        )));
    }
    for (i, &declared) in slot.arg_types.iter().enumerate().take(argc) {
        if declared == TypeTag::ALL {
            continue;
        }
        let Some(arg) = vecobj::get(args, i) else {
            continue;
        };
        if arg.tag() != declared {
            return Err(RuntimeError::Argument(format!(
                "argument {} of {} must be {}.",
                i + 1,
                slot.name,
                declared
            )));
        }
    }

    match slot.name {
        "print" => builtin_print(interp, args),
        "hash" => builtin_hash(interp, args),
        "len" => builtin_len(interp, args),
        "append" => builtin_append(interp, args),
        "remove" => builtin_remove(interp, args),
        "exit" => builtin_exit(interp, args),
        "spawn" => builtin_spawn(interp, args),
        "join" => builtin_join(interp, args),
        "cancel" => builtin_cancel(interp, args),
        _ => Err(RuntimeError::Argument(format!(
            "unknown builtin slot {id}."
        ))),
    }
}

fn arg(args: ObjRef, i: usize) -> Result<ObjRef, RuntimeError> {
    vecobj::get(args, i).ok_or_else(|| RuntimeError::Argument("missing argument.".to_string()))
}

fn builtin_print(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let text = object::print_str(arg(args, 0)?);
    interp.write_out(&text);
    interp.write_out("\n");
    Ok(interp.heap.void_obj())
}

fn builtin_hash(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    object::hash(&mut interp.heap, arg(args, 0)?)
}

fn builtin_len(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    object::len(&mut interp.heap, arg(args, 0)?)
}

fn builtin_append(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let target = arg(args, 0)?;
    for i in 1..vecobj::len(args) {
        vecobj::push(target, arg(args, i)?);
    }
    Ok(interp.heap.void_obj())
}

fn builtin_remove(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let container = arg(args, 0)?;
    let key = arg(args, 1)?;
    match container.tag() {
        TypeTag::VEC => {
            if !key.tag().is_integer() {
                return Err(RuntimeError::Type("vec pos must be an integer type.".to_string()));
            }
            vecobj::remove(&mut interp.heap, container, object::get_integer(key))?;
        }
        TypeTag::DICT => {
            object::dictobj::remove(&mut interp.heap, container, key)?;
        }
        t => {
            return Err(RuntimeError::Type(format!(
                "can not remove from {t}."
            )));
        }
    }
    Ok(interp.heap.void_obj())
}

fn builtin_exit(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let status = arg(args, 0)?;
    if !status.tag().is_integer() {
        return Err(RuntimeError::Argument("exit status must be an integer.".to_string()));
    }
    let code = object::get_integer(status) as i32;
    interp.flush_out();
    std::process::exit(code);
}

fn builtin_spawn(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let func = arg(args, 0)?;
    let mut rest = Vec::new();
    for i in 1..vecobj::len(args) {
        rest.push(arg(args, i)?);
    }
    let id = thread::spawn(interp, func, &rest)?;
    Ok(interp.heap.long_obj(id))
}

fn builtin_join(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let id = object::get_integer(arg(args, 0)?);
    thread::join(interp, id)
}

fn builtin_cancel(interp: &mut Interp, args: ObjRef) -> Result<ObjRef, RuntimeError> {
    let id = object::get_integer(arg(args, 0)?);
    thread::cancel(interp, id);
    Ok(interp.heap.void_obj())
}
