// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! DICT operations.
//!
//! Open-addressing hash table from object keys to object values,
//! probing linearly from the key's digest. Keys must be hashable
//! (numeric or STR). Reading an absent key yields null, never an
//! error. The table doubles when three quarters of the slots are
//! filled and shrinks to half when the live load drops below a
//! quarter. Iteration order is unspecified.

use crate::error::RuntimeError;
use crate::heap::Heap;

use super::{digest, value_eq, Body, ObjRef, OpResult};

/// Initial slot count of a non-empty table.
const MIN_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
enum Entry {
    Empty,
    /// Removed entry; probing continues past it.
    Tomb,
    Pair { digest: u64, key: ObjRef, val: ObjRef },
}

/// Dict payload.
pub struct DictBody {
    entries: Box<[Entry]>,
    /// Live pairs.
    used: usize,
    /// Live pairs plus tombstones.
    filled: usize,
}

impl DictBody {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Box::new([]),
            used: 0,
            filled: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.used
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Iterate live pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, ObjRef)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Pair { key, val, .. } => Some((*key, *val)),
            _ => None,
        })
    }

    /// Push every owned reference into `out` (destructor support).
    pub fn collect_refs(&self, out: &mut Vec<ObjRef>) {
        for e in self.entries.iter() {
            if let Entry::Pair { key, val, .. } = e {
                out.push(*key);
                out.push(*val);
            }
        }
    }

    /// Raw slot count, live or not. Collector traversal support; keys
    /// are always untrackable scalars or strings and never form
    /// cycles, so only values are exposed.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    /// The value stored in slot `i`, if it holds a live pair.
    #[must_use]
    pub fn value_at(&self, i: usize) -> Option<ObjRef> {
        match self.entries.get(i) {
            Some(Entry::Pair { val, .. }) => Some(*val),
            _ => None,
        }
    }

    /// Overwrite the value in slot `i` (cycle breaking).
    pub fn replace_value_at(&mut self, i: usize, value: ObjRef) {
        if let Some(Entry::Pair { val, .. }) = self.entries.get_mut(i) {
            *val = value;
        }
    }

    /// Find the slot of `key`, or the insertion slot if absent.
    /// Returns (slot, found).
    fn probe(&self, d: u64, key: ObjRef) -> Result<(usize, bool), RuntimeError> {
        let cap = self.entries.len();
        debug_assert!(cap.is_power_of_two());
        let mut i = d as usize & (cap - 1);
        let mut insert_at: Option<usize> = None;
        loop {
            match self.entries[i] {
                Entry::Empty => return Ok((insert_at.unwrap_or(i), false)),
                Entry::Tomb => {
                    if insert_at.is_none() {
                        insert_at = Some(i);
                    }
                }
                Entry::Pair {
                    digest: ed,
                    key: ek,
                    ..
                } => {
                    if ed == d && value_eq(ek, key)? {
                        return Ok((i, true));
                    }
                }
            }
            i = (i + 1) & (cap - 1);
        }
    }

    fn rehash(&mut self, new_cap: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::Empty; new_cap].into());
        self.filled = self.used;
        for e in old {
            if let Entry::Pair { digest: d, key, val } = e {
                let cap = self.entries.len();
                let mut i = d as usize & (cap - 1);
                while let Entry::Pair { .. } = self.entries[i] {
                    i = (i + 1) & (cap - 1);
                }
                self.entries[i] = Entry::Pair { digest: d, key, val };
            }
        }
    }
}

impl Default for DictBody {
    fn default() -> Self {
        Self::new()
    }
}

fn check_key(key: ObjRef) -> Result<(), RuntimeError> {
    if !key.tag().is_hashable_key() {
        return Err(RuntimeError::Key(format!(
            "invalid dict key type {}.",
            key.tag()
        )));
    }
    Ok(())
}

/// Subscript read: the mapped value, or null when absent.
pub fn index(heap: &mut Heap, d: ObjRef, key: ObjRef) -> OpResult {
    check_key(key)?;
    let kd = digest(heap, key);
    let null = heap.null_obj();
    match &d.obj().body {
        Body::Dict(body) => {
            if body.entries.is_empty() {
                return Ok(null);
            }
            let (slot, found) = body.probe(kd, key)?;
            if !found {
                return Ok(null);
            }
            match body.entries[slot] {
                Entry::Pair { val, .. } => Ok(val),
                _ => Ok(null),
            }
        }
        _ => Ok(null),
    }
}

/// Subscript write: insert or update. A new key takes a reference on
/// the key; the value always gains one and any replaced value loses
/// its own.
pub fn ipindex(heap: &mut Heap, d: ObjRef, key: ObjRef, value: ObjRef) -> OpResult {
    check_key(key)?;
    let kd = digest(heap, key);

    let prev = {
        let Body::Dict(body) = &mut d.obj_mut().body else {
            return Err(RuntimeError::Type("not a dict.".to_string()));
        };
        if body.entries.is_empty() {
            body.rehash(MIN_CAPACITY);
        } else if (body.filled + 1) * 4 >= body.entries.len() * 3 {
            body.rehash((body.entries.len() * 2).max(MIN_CAPACITY));
        }
        let (slot, found) = body.probe(kd, key)?;
        if found {
            value.inc_ref();
            match &mut body.entries[slot] {
                Entry::Pair { val, .. } => Some(std::mem::replace(val, value)),
                _ => None,
            }
        } else {
            key.inc_ref();
            value.inc_ref();
            if matches!(body.entries[slot], Entry::Empty) {
                body.filled += 1;
            }
            body.entries[slot] = Entry::Pair {
                digest: kd,
                key,
                val: value,
            };
            body.used += 1;
            None
        }
    };
    if let Some(prev) = prev {
        heap.unref(prev);
    }
    Ok(value)
}

/// Remove a key and its value, dropping both references. Returns
/// whether the key was present. Shrinks the table when the live load
/// drops below a quarter.
pub fn remove(heap: &mut Heap, d: ObjRef, key: ObjRef) -> Result<bool, RuntimeError> {
    check_key(key)?;
    let kd = digest(heap, key);

    let removed = {
        let Body::Dict(body) = &mut d.obj_mut().body else {
            return Err(RuntimeError::Type("not a dict.".to_string()));
        };
        if body.entries.is_empty() {
            return Ok(false);
        }
        let (slot, found) = body.probe(kd, key)?;
        if !found {
            return Ok(false);
        }
        let entry = std::mem::replace(&mut body.entries[slot], Entry::Tomb);
        body.used -= 1;
        let cap = body.entries.len();
        if cap > MIN_CAPACITY && body.used * 4 < cap {
            body.rehash((cap / 2).max(MIN_CAPACITY));
        }
        match entry {
            Entry::Pair { key, val, .. } => Some((key, val)),
            _ => None,
        }
    };
    if let Some((k, v)) = removed {
        heap.unref(k);
        heap.unref(v);
    }
    Ok(true)
}
