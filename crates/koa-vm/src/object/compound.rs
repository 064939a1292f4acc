// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! STRUCT and UNION member access.
//!
//! A struct owns one slot per declared field, initialized to null.
//! A union owns a single optional value; reading it through any
//! declared field casts the stored value to that field's type lazily.
//! Field metadata lives with the declaring code unit; every instance
//! holds a shared handle to its meta entry.

use crate::error::RuntimeError;
use crate::heap::Heap;

use super::{cast, Body, ObjRef, OpResult};

/// Read a struct or union member by declared name.
pub fn get_member(heap: &mut Heap, compound: ObjRef, name: &str) -> OpResult {
    if compound.tag().is_struct() {
        let (field, _) = struct_field(compound, name)?;
        Ok(field)
    } else {
        union_get(heap, compound, name)
    }
}

/// Write a struct or union member by declared name. The stored value
/// is cast to the field's declared type where they differ; the store
/// takes a reference and releases the replaced value's.
pub fn store_member(heap: &mut Heap, compound: ObjRef, name: &str, value: ObjRef) -> OpResult {
    if compound.tag().is_struct() {
        struct_store(heap, compound, name, value)
    } else {
        union_store(heap, compound, name, value)
    }
}

fn struct_field(compound: ObjRef, name: &str) -> Result<(ObjRef, usize), RuntimeError> {
    match &compound.obj().body {
        Body::Struct(s) => match s.meta.find_field(name) {
            Some(idx) => Ok((s.fields[idx], idx)),
            None => Err(RuntimeError::Name(format!(
                "struct {} has no member {name}.",
                s.meta.name
            ))),
        },
        _ => Err(RuntimeError::Type("not a compound.".to_string())),
    }
}

fn struct_store(heap: &mut Heap, compound: ObjRef, name: &str, value: ObjRef) -> OpResult {
    let (idx, declared) = match &compound.obj().body {
        Body::Struct(s) => match s.meta.find_field(name) {
            Some(idx) => (idx, s.meta.fields[idx].1),
            None => {
                return Err(RuntimeError::Name(format!(
                    "struct {} has no member {name}.",
                    s.meta.name
                )));
            }
        },
        _ => return Err(RuntimeError::Type("not a compound.".to_string())),
    };

    let stored = if value.tag() == declared || value.is_null() {
        value
    } else {
        let casted = cast(heap, value, declared)?;
        heap.discard(value);
        casted
    };
    stored.inc_ref();
    let prev = match &mut compound.obj_mut().body {
        Body::Struct(s) => std::mem::replace(&mut s.fields[idx], stored),
        _ => stored,
    };
    if prev != stored {
        heap.unref(prev);
    }
    Ok(stored)
}

fn union_get(heap: &mut Heap, compound: ObjRef, name: &str) -> OpResult {
    let (stored, declared) = match &compound.obj().body {
        Body::Union(u) => match u.meta.find_field(name) {
            Some(idx) => (u.value, u.meta.fields[idx].1),
            None => {
                return Err(RuntimeError::Name(format!(
                    "union {} has no member {name}.",
                    u.meta.name
                )));
            }
        },
        _ => return Err(RuntimeError::Type("not a compound.".to_string())),
    };
    let Some(stored) = stored else {
        return Ok(heap.null_obj());
    };
    // Reading through a field view casts the stored value lazily.
    if stored.tag() == declared {
        Ok(stored)
    } else {
        cast(heap, stored, declared)
    }
}

fn union_store(heap: &mut Heap, compound: ObjRef, name: &str, value: ObjRef) -> OpResult {
    let known = match &compound.obj().body {
        Body::Union(u) => u.meta.find_field(name).is_some(),
        _ => return Err(RuntimeError::Type("not a compound.".to_string())),
    };
    if !known {
        let name_of = match &compound.obj().body {
            Body::Union(u) => u.meta.name.clone(),
            _ => String::new(),
        };
        return Err(RuntimeError::Name(format!(
            "union {name_of} has no member {name}."
        )));
    }
    value.inc_ref();
    let prev = match &mut compound.obj_mut().body {
        Body::Union(u) => u.value.replace(value),
        _ => None,
    };
    if let Some(prev) = prev {
        if prev != value {
            heap.unref(prev);
        }
    }
    Ok(value)
}
