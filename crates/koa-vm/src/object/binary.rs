// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Object serialization.
//!
//! Every object serializes as its type tag followed by a type-specific
//! payload: numerics as little-endian bytes, strings as a machine-sized
//! length plus bytes, containers as a length plus their elements
//! recursively, functions as a builtin marker plus either a slot id or
//! a full code image. Worker threads use this format to hand their
//! return value back to the parent.

use std::rc::Rc;

use crate::code::binary::{
    put_i32, put_u64, put_usize, read_code, write_code, BinaryError, ByteReader,
};
use crate::code::Code;
use crate::heap::Heap;
use crate::types::TypeTag;

use super::{Body, FuncBody, Num, ObjRef};

/// Builtin markers in a FUNC image.
const FUNC_KIND_CODE: u8 = 0;
const FUNC_KIND_BUILTIN: u8 = 1;
const FUNC_KIND_NULL: u8 = 2;

/// Serialize one object, tag first.
pub fn write_obj(r: ObjRef, out: &mut Vec<u8>) {
    put_i32(out, r.tag().0);
    match &r.obj().body {
        Body::Void | Body::Null | Body::Frame => {}
        Body::Bool(b) => out.push(u8::from(*b)),
        Body::Char(c) => out.push(*c),
        Body::Int(v) | Body::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Long(v) | Body::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Uint8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Uint16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Uint32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Uint64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
        Body::Str(s) => {
            put_usize(out, s.bytes.len());
            out.extend_from_slice(&s.bytes);
        }
        Body::Exception(msg) => {
            put_usize(out, msg.len());
            out.extend_from_slice(msg);
        }
        Body::Vec(elems) => {
            put_usize(out, elems.len());
            for &e in elems {
                write_obj(e, out);
            }
        }
        Body::Dict(d) => {
            put_usize(out, d.len());
            for (k, v) in d.iter() {
                write_obj(k, out);
                write_obj(v, out);
            }
        }
        Body::Struct(s) => {
            for &f in &s.fields {
                write_obj(f, out);
            }
        }
        Body::Union(u) => match u.value {
            Some(v) => {
                out.push(1);
                write_obj(v, out);
            }
            None => out.push(0),
        },
        Body::Func(FuncBody::Null) => out.push(FUNC_KIND_NULL),
        Body::Func(FuncBody::Builtin(slot)) => {
            out.push(FUNC_KIND_BUILTIN);
            put_u64(out, u64::from(*slot));
        }
        Body::Func(FuncBody::Code(code)) => {
            out.push(FUNC_KIND_CODE);
            write_code(code, out);
        }
        Body::Mod(code) => write_code(code, out),
    }
}

/// Serialize one object into a fresh buffer.
#[must_use]
pub fn to_bytes(r: ObjRef) -> Vec<u8> {
    let mut out = Vec::new();
    write_obj(r, &mut out);
    out
}

macro_rules! read_le {
    ($r:expr, $t:ty) => {{
        let b = $r.take(std::mem::size_of::<$t>())?;
        let mut a = [0u8; std::mem::size_of::<$t>()];
        a.copy_from_slice(b);
        <$t>::from_le_bytes(a)
    }};
}

/// Deserialize one object into `heap`.
///
/// Struct and union images need `meta_code` (a code unit whose meta
/// tables cover their tags) to rebuild field metadata.
pub fn read_obj(
    heap: &mut Heap,
    r: &mut ByteReader<'_>,
    meta_code: Option<&Code>,
) -> Result<ObjRef, BinaryError> {
    let tag = TypeTag(r.read_i32()?);
    Ok(match tag {
        TypeTag::VOID => heap.void_obj(),
        TypeTag::NULL => heap.null_obj(),
        TypeTag::BOOL => heap.bool_obj(r.read_u8()? != 0),
        TypeTag::CHAR => {
            let c = r.read_u8()?;
            heap.char_obj(c)
        }
        TypeTag::INT | TypeTag::INT32 => {
            let v = read_le!(r, i32);
            heap.num_obj(tag, Num::Int(i64::from(v)))
        }
        TypeTag::LONG | TypeTag::INT64 => {
            let v = read_le!(r, i64);
            heap.num_obj(tag, Num::Int(v))
        }
        TypeTag::INT8 => heap.num_obj(tag, Num::Int(i64::from(read_le!(r, i8)))),
        TypeTag::UINT8 => heap.num_obj(tag, Num::Int(i64::from(read_le!(r, u8)))),
        TypeTag::INT16 => heap.num_obj(tag, Num::Int(i64::from(read_le!(r, i16)))),
        TypeTag::UINT16 => heap.num_obj(tag, Num::Int(i64::from(read_le!(r, u16)))),
        TypeTag::UINT32 => heap.num_obj(tag, Num::Int(i64::from(read_le!(r, u32)))),
        TypeTag::UINT64 => heap.num_obj(tag, Num::Uint(read_le!(r, u64))),
        TypeTag::FLOAT => heap.float_obj(read_le!(r, f32)),
        TypeTag::DOUBLE => heap.double_obj(read_le!(r, f64)),
        TypeTag::STR => {
            let len = r.read_usize()?;
            let bytes = r.take(len)?;
            heap.str_obj(bytes)
        }
        TypeTag::EXCEPTION => {
            let len = r.read_usize()?;
            let bytes = r.take(len)?.to_vec();
            let msg = String::from_utf8_lossy(&bytes).into_owned();
            heap.exception_obj(&msg)
        }
        TypeTag::VEC => {
            let len = r.read_usize()?;
            let mut elems = Vec::with_capacity(len);
            for _ in 0..len {
                let e = read_obj(heap, r, meta_code)?;
                e.inc_ref();
                elems.push(e);
            }
            heap.vec_obj(elems)
        }
        TypeTag::DICT => {
            let len = r.read_usize()?;
            let d = heap.dict_obj();
            for _ in 0..len {
                let k = read_obj(heap, r, meta_code)?;
                let v = read_obj(heap, r, meta_code)?;
                super::dictobj::ipindex(heap, d, k, v)
                    .map_err(|_| BinaryError::Malformed("unusable dict key in image"))?;
                heap.discard(k);
                heap.discard(v);
            }
            d
        }
        TypeTag::FUNC => match r.read_u8()? {
            FUNC_KIND_NULL => heap.alloc_obj(TypeTag::FUNC, Body::Func(FuncBody::Null)),
            FUNC_KIND_BUILTIN => {
                let slot = r.read_u64()? as u32;
                heap.builtin_obj(slot)
            }
            FUNC_KIND_CODE => {
                let code = read_code(heap, r)?;
                heap.func_obj(Rc::new(code))
            }
            _ => return Err(BinaryError::Malformed("unknown func kind in image")),
        },
        TypeTag::MOD => {
            let code = read_code(heap, r)?;
            heap.mod_obj(Rc::new(code))
        }
        t if t.is_compound() => {
            let Some(meta) = meta_code.and_then(|c| c.find_compound(t)) else {
                return Err(BinaryError::BadTag(t.0));
            };
            if t.is_struct() {
                let s = heap.struct_obj(t, Rc::clone(&meta));
                for idx in 0..meta.fields.len() {
                    let value = read_obj(heap, r, meta_code)?;
                    value.inc_ref();
                    let prev = match &mut s.obj_mut().body {
                        Body::Struct(body) => std::mem::replace(&mut body.fields[idx], value),
                        _ => value,
                    };
                    if prev != value {
                        heap.unref(prev);
                    }
                }
                s
            } else {
                let u = heap.union_obj(t, meta);
                if r.read_u8()? != 0 {
                    let value = read_obj(heap, r, meta_code)?;
                    value.inc_ref();
                    match &mut u.obj_mut().body {
                        Body::Union(body) => body.value = Some(value),
                        _ => {}
                    }
                }
                u
            }
        }
        t => return Err(BinaryError::BadTag(t.0)),
    })
}
