// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Deep copy of object graphs.
//!
//! Worker threads never share live objects with their parent: spawn
//! arguments are copied transitively into the child's heap before the
//! thread starts, and worker threads copy non-VOID constants on load.
//! A visited map keeps shared structure shared and terminates on
//! cycles.

use std::collections::HashMap;
use std::rc::Rc;

use crate::code::binary::{read_code, write_code, ByteReader};
use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::types::TypeTag;

use super::{get_num, Body, FuncBody, ObjRef, OpResult};

/// Deep-copy `src` into `dst`, returning the copy.
///
/// The source graph may live in another thread's heap; it is only
/// read. Function and module code is re-materialized through its
/// binary image so no code is shared either.
pub fn deep_copy(dst: &mut Heap, src: ObjRef) -> OpResult {
    let mut visited: HashMap<usize, ObjRef> = HashMap::new();
    copy_rec(dst, src, &mut visited)
}

fn copy_rec(
    dst: &mut Heap,
    src: ObjRef,
    visited: &mut HashMap<usize, ObjRef>,
) -> OpResult {
    if let Some(&copied) = visited.get(&(src.as_ptr() as usize)) {
        return Ok(copied);
    }

    let tag = src.tag();
    let copied = match &src.obj().body {
        Body::Void => dst.void_obj(),
        Body::Null => dst.null_obj(),
        Body::Bool(b) => dst.bool_obj(*b),
        Body::Char(c) => dst.char_obj(*c),
        Body::Int(_)
        | Body::Long(_)
        | Body::Int8(_)
        | Body::Uint8(_)
        | Body::Int16(_)
        | Body::Uint16(_)
        | Body::Int32(_)
        | Body::Uint32(_)
        | Body::Int64(_)
        | Body::Uint64(_)
        | Body::Float(_)
        | Body::Double(_) => dst.num_obj(tag, get_num(src)),
        Body::Str(s) => dst.str_obj(&s.bytes),
        Body::Exception(msg) => {
            let text = String::from_utf8_lossy(msg).into_owned();
            dst.exception_obj(&text)
        }
        Body::Vec(elems) => {
            let n = elems.len();
            let copy = dst.vec_obj(Vec::with_capacity(n));
            visited.insert(src.as_ptr() as usize, copy);
            for i in 0..n {
                let Some(elem) = super::vecobj::get(src, i) else {
                    break;
                };
                let elem_copy = copy_rec(dst, elem, visited)?;
                super::vecobj::push(copy, elem_copy);
            }
            return Ok(copy);
        }
        Body::Dict(_) => {
            let copy = dst.dict_obj();
            visited.insert(src.as_ptr() as usize, copy);
            let pairs: Vec<(ObjRef, ObjRef)> = match &src.obj().body {
                Body::Dict(d) => d.iter().collect(),
                _ => Vec::new(),
            };
            for (k, v) in pairs {
                let kc = copy_rec(dst, k, visited)?;
                let vc = copy_rec(dst, v, visited)?;
                super::dictobj::ipindex(dst, copy, kc, vc)?;
                dst.discard(kc);
                dst.discard(vc);
            }
            return Ok(copy);
        }
        Body::Struct(s) => {
            let meta = Rc::new((*s.meta).clone());
            let n = s.fields.len();
            let copy = dst.struct_obj(tag, meta);
            visited.insert(src.as_ptr() as usize, copy);
            for idx in 0..n {
                let field = match &src.obj().body {
                    Body::Struct(body) => body.fields[idx],
                    _ => break,
                };
                let field_copy = copy_rec(dst, field, visited)?;
                field_copy.inc_ref();
                let prev = match &mut copy.obj_mut().body {
                    Body::Struct(body) => std::mem::replace(&mut body.fields[idx], field_copy),
                    _ => field_copy,
                };
                if prev != field_copy {
                    dst.unref(prev);
                }
            }
            return Ok(copy);
        }
        Body::Union(u) => {
            let meta = Rc::new((*u.meta).clone());
            let stored = u.value;
            let copy = dst.union_obj(tag, meta);
            visited.insert(src.as_ptr() as usize, copy);
            if let Some(v) = stored {
                let vc = copy_rec(dst, v, visited)?;
                vc.inc_ref();
                match &mut copy.obj_mut().body {
                    Body::Union(body) => body.value = Some(vc),
                    _ => {}
                }
            }
            return Ok(copy);
        }
        Body::Func(FuncBody::Null) => {
            dst.alloc_obj(TypeTag::FUNC, Body::Func(FuncBody::Null))
        }
        Body::Func(FuncBody::Builtin(slot)) => dst.builtin_obj(*slot),
        Body::Func(FuncBody::Code(code)) => {
            let copy = recode(dst, code)?;
            dst.func_obj(copy)
        }
        Body::Mod(code) => {
            let copy = recode(dst, code)?;
            dst.mod_obj(copy)
        }
        Body::Frame => dst.void_obj(),
    };
    visited.insert(src.as_ptr() as usize, copied);
    Ok(copied)
}

/// Rebuild a code unit in `dst` through its binary image.
fn recode(dst: &mut Heap, code: &Rc<crate::code::Code>) -> Result<Rc<crate::code::Code>, RuntimeError> {
    let mut image = Vec::new();
    write_code(code, &mut image);
    let mut reader = ByteReader::new(&image);
    read_code(dst, &mut reader)
        .map(Rc::new)
        .map_err(|e| RuntimeError::Type(format!("failed to copy code: {e}.")))
}
