// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! VEC operations.
//!
//! A vec owns its element references. Storage grows by doubling (the
//! underlying buffer's policy) and shrinks to half capacity when the
//! load falls below a quarter after a removal.

use crate::error::RuntimeError;
use crate::heap::Heap;

use super::{get_integer, value_eq, Body, ObjRef, OpResult};

/// Element count.
#[must_use]
pub fn len(v: ObjRef) -> usize {
    match &v.obj().body {
        Body::Vec(elems) => elems.len(),
        _ => 0,
    }
}

/// Element at `i`, if in bounds.
#[must_use]
pub fn get(v: ObjRef, i: usize) -> Option<ObjRef> {
    match &v.obj().body {
        Body::Vec(elems) => elems.get(i).copied(),
        _ => None,
    }
}

/// Append one element, taking a reference on it.
pub fn push(v: ObjRef, value: ObjRef) {
    value.inc_ref();
    if let Body::Vec(elems) = &mut v.obj_mut().body {
        elems.push(value);
    }
}

/// Concatenate two vecs into a new one.
pub fn concat(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    let mut joined: Vec<ObjRef> = Vec::with_capacity(len(a) + len(b));
    for src in [a, b] {
        if let Body::Vec(elems) = &src.obj().body {
            for &e in elems {
                e.inc_ref();
                joined.push(e);
            }
        }
    }
    Ok(heap.vec_obj(joined))
}

/// Subscript read; fails out of bounds.
pub fn index(v: ObjRef, key: ObjRef) -> OpResult {
    if !key.tag().is_integer() {
        return Err(RuntimeError::Type("vec index must be an integer.".to_string()));
    }
    let pos = get_integer(key);
    if pos < 0 || pos as usize >= len(v) {
        return Err(RuntimeError::Index("vec index out of bound.".to_string()));
    }
    match get(v, pos as usize) {
        Some(e) => Ok(e),
        None => Err(RuntimeError::Index("vec index out of bound.".to_string())),
    }
}

/// Subscript write. Writing one past the end appends; writing in
/// bounds replaces and drops the previous element's reference.
pub fn ipindex(heap: &mut Heap, v: ObjRef, key: ObjRef, value: ObjRef) -> OpResult {
    if !key.tag().is_integer() {
        return Err(RuntimeError::Type("vec index must be an integer.".to_string()));
    }
    let pos = get_integer(key);
    let n = len(v);
    if pos < 0 || pos as usize > n {
        return Err(RuntimeError::Index("vec index out of bound.".to_string()));
    }
    value.inc_ref();
    let prev = {
        match &mut v.obj_mut().body {
            Body::Vec(elems) => {
                if pos as usize == n {
                    elems.push(value);
                    None
                } else {
                    Some(std::mem::replace(&mut elems[pos as usize], value))
                }
            }
            _ => None,
        }
    };
    if let Some(prev) = prev {
        heap.unref(prev);
    }
    Ok(value)
}

/// Remove the element at an integer position, dropping its reference.
/// Shrinks the buffer when the load falls below a quarter.
pub fn remove(heap: &mut Heap, v: ObjRef, pos: i64) -> Result<(), RuntimeError> {
    let n = len(v);
    if pos < 0 || pos as usize >= n {
        return Err(RuntimeError::Index("vec index out of bound.".to_string()));
    }
    let removed = match &mut v.obj_mut().body {
        Body::Vec(elems) => {
            let removed = elems.remove(pos as usize);
            if elems.len() < elems.capacity() / 4 {
                elems.shrink_to(elems.capacity() / 2);
            }
            Some(removed)
        }
        _ => None,
    };
    if let Some(removed) = removed {
        heap.unref(removed);
    }
    Ok(())
}

/// Element-wise equality.
pub fn elements_eq(a: ObjRef, b: ObjRef) -> Result<bool, RuntimeError> {
    if len(a) != len(b) {
        return Ok(false);
    }
    for i in 0..len(a) {
        let (Some(x), Some(y)) = (get(a, i), get(b, i)) else {
            return Ok(false);
        };
        if !value_eq(x, y)? {
            return Ok(false);
        }
    }
    Ok(true)
}
