// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! STR operations.
//!
//! Strings are immutable byte buffers. Strings of five bytes or fewer
//! are interned by the heap; two requests for the same short string
//! return the identical object.

use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::types::TypeTag;

use super::{get_integer, Body, ObjRef, OpResult};

/// Borrow the byte content of a STR object.
///
/// The returned slice aliases the cell's buffer; callers must not hold
/// it across an operation that can free the object.
#[must_use]
pub fn bytes(r: ObjRef) -> &'static [u8] {
    match &r.obj().body {
        // SAFETY: the buffer lives as long as the cell, and STR
        // buffers are never mutated after construction.
        Body::Str(s) => unsafe { &*std::ptr::from_ref::<[u8]>(&s.bytes) },
        _ => &[],
    }
}

/// Concatenation; the right operand must be a STR.
pub fn concat(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    if b.tag() != TypeTag::STR {
        return Err(RuntimeError::Type(format!(
            "invalid right operand type {} for '+'.",
            b.tag()
        )));
    }
    let mut joined = Vec::with_capacity(bytes(a).len() + bytes(b).len());
    joined.extend_from_slice(bytes(a));
    joined.extend_from_slice(bytes(b));
    Ok(heap.str_obj(&joined))
}

/// Subscript read: the byte at an integer position, as a CHAR.
pub fn index(heap: &mut Heap, s: ObjRef, key: ObjRef) -> OpResult {
    if !key.tag().is_integer() {
        return Err(RuntimeError::Type("str index must be an integer.".to_string()));
    }
    let pos = get_integer(key);
    let data = bytes(s);
    if pos < 0 || pos as usize >= data.len() {
        return Err(RuntimeError::Index("str index out of bound.".to_string()));
    }
    Ok(heap.char_obj(data[pos as usize]))
}

/// MurmurHash2-64A over `data` with the given seed.
#[must_use]
pub fn murmur2_64a(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let mut h: u64 = seed ^ (data.len() as u64).wrapping_mul(M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let mut k = u64::from_le_bytes(word);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k: u64 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k |= u64::from(b) << (8 * i);
        }
        h ^= k;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}
