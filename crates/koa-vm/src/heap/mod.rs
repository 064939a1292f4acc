// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-thread object heap.
//!
//! A [`Heap`] bundles everything one interpreter thread needs to create
//! and destroy objects: the pool [`Allocator`], the cycle collector
//! generations, the NULL/TRUE/FALSE/VOID singletons, the CHAR and
//! small-INT caches, the interned-string table and the constant
//! registry. Worker threads receive a freshly built heap, so no two
//! threads ever touch the same cells.
//!
//! Objects are born with a reference count of zero; the first consumer
//! takes a reference. [`Heap::unref`] drops a reference and frees the
//! cell at zero; [`Heap::discard`] releases a temporary that never got
//! referenced.

#[cfg(test)]
mod heap_test;

use std::collections::HashMap;
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::sync::OnceLock;

use crate::code::{Code, CompoundMeta};
use crate::error::{fatal, RuntimeError};
use crate::gc::Gc;
use crate::object::{
    strobj, Body, DictBody, FuncBody, Num, Obj, ObjRef, StrBody, StructBody, UnionBody,
};
use crate::pool::Allocator;
use crate::types::TypeTag;

/// Strings at or below this byte length are interned.
pub const INTERN_STR_LEN: usize = 5;

/// Smallest cached INT value.
pub const INT_CACHE_MIN: i32 = -1000;
/// Largest cached INT value.
pub const INT_CACHE_MAX: i32 = 10000;

/// Process-wide seed for the string digest, chosen once at startup.
static STR_SEED: OnceLock<u64> = OnceLock::new();

fn str_seed_init() -> u64 {
    // A zero digest means "not computed", so the seed must not map the
    // empty string to zero; any nonzero seed works.
    *STR_SEED.get_or_init(|| rand::random::<u64>() | 1)
}

/// One thread's object heap.
pub struct Heap {
    pub(crate) alloc: Allocator,
    pub gc: Gc,
    void_obj: ObjRef,
    null_obj: ObjRef,
    true_obj: ObjRef,
    false_obj: ObjRef,
    char_cache: [Option<ObjRef>; 256],
    int_cache: Box<[Option<ObjRef>]>,
    /// Interned strings by digest; the table holds a strong reference.
    interned: HashMap<u64, Vec<ObjRef>>,
    /// Compile-time constants pinned for the heap's lifetime.
    consts: Vec<ObjRef>,
    seed: u64,
    torn_down: bool,
}

// A heap is owned by exactly one thread at a time; worker threads
// receive theirs by value before they start.
unsafe impl Send for Heap {}

impl Heap {
    /// Build a heap with its singletons in place.
    #[must_use]
    pub fn new() -> Self {
        let mut alloc = Allocator::new();
        let void_obj = Self::singleton(&mut alloc, TypeTag::VOID, Body::Void);
        let null_obj = Self::singleton(&mut alloc, TypeTag::NULL, Body::Null);
        let true_obj = Self::singleton(&mut alloc, TypeTag::BOOL, Body::Bool(true));
        let false_obj = Self::singleton(&mut alloc, TypeTag::BOOL, Body::Bool(false));

        Self {
            alloc,
            gc: Gc::new(),
            void_obj,
            null_obj,
            true_obj,
            false_obj,
            char_cache: [None; 256],
            int_cache: vec![None; (INT_CACHE_MAX - INT_CACHE_MIN + 1) as usize]
                .into_boxed_slice(),
            interned: HashMap::new(),
            consts: Vec::new(),
            seed: str_seed_init(),
            torn_down: false,
        }
    }

    fn singleton(alloc: &mut Allocator, tag: TypeTag, body: Body) -> ObjRef {
        let cell = alloc.alloc(std::mem::size_of::<Obj>()).cast::<Obj>();
        // SAFETY: `cell` is a fresh, properly sized and aligned cell.
        unsafe { ptr::write(cell, Obj::new(tag, body)) };
        let Some(nn) = NonNull::new(cell) else {
            fatal("singleton allocation returned null.");
        };
        let r = ObjRef::from_ptr(nn);
        r.obj_mut().head.immortal = true;
        r.obj_mut().head.refcnt = 1;
        r
    }

    /// The process seed used for string digests.
    #[inline]
    #[must_use]
    pub fn str_seed(&self) -> u64 {
        self.seed
    }

    /// The VOID dummy singleton.
    #[inline]
    #[must_use]
    pub fn void_obj(&self) -> ObjRef {
        self.void_obj
    }

    /// The NULL singleton.
    #[inline]
    #[must_use]
    pub fn null_obj(&self) -> ObjRef {
        self.null_obj
    }

    /// One of the two BOOL singletons.
    #[inline]
    #[must_use]
    pub fn bool_obj(&self, b: bool) -> ObjRef {
        if b { self.true_obj } else { self.false_obj }
    }

    /// Allocate a fresh object cell, registering containers with the
    /// collector.
    pub fn alloc_obj(&mut self, tag: TypeTag, body: Body) -> ObjRef {
        let cell = self.alloc.alloc(std::mem::size_of::<Obj>()).cast::<Obj>();
        // SAFETY: fresh cell of the right size and alignment.
        unsafe { ptr::write(cell, Obj::new(tag, body)) };
        let Some(nn) = NonNull::new(cell) else {
            fatal("object allocation returned null.");
        };
        let r = ObjRef::from_ptr(nn);
        if tag.is_trackable() {
            self.gc.track(r);
        }
        r
    }

    /// Cached CHAR object.
    pub fn char_obj(&mut self, c: u8) -> ObjRef {
        if let Some(r) = self.char_cache[c as usize] {
            return r;
        }
        let r = self.alloc_obj(TypeTag::CHAR, Body::Char(c));
        r.inc_ref();
        self.char_cache[c as usize] = Some(r);
        r
    }

    /// INT object, cached for values in the cache window.
    pub fn int_obj(&mut self, v: i32) -> ObjRef {
        if (INT_CACHE_MIN..=INT_CACHE_MAX).contains(&v) {
            let idx = (v - INT_CACHE_MIN) as usize;
            if let Some(r) = self.int_cache[idx] {
                return r;
            }
            let r = self.alloc_obj(TypeTag::INT, Body::Int(v));
            r.inc_ref();
            self.int_cache[idx] = Some(r);
            return r;
        }
        self.alloc_obj(TypeTag::INT, Body::Int(v))
    }

    pub fn long_obj(&mut self, v: i64) -> ObjRef {
        self.alloc_obj(TypeTag::LONG, Body::Long(v))
    }

    pub fn double_obj(&mut self, v: f64) -> ObjRef {
        self.alloc_obj(TypeTag::DOUBLE, Body::Double(v))
    }

    pub fn float_obj(&mut self, v: f32) -> ObjRef {
        self.alloc_obj(TypeTag::FLOAT, Body::Float(v))
    }

    /// Construct a numeric object of `tag` from a widened value,
    /// truncating the way a cast would.
    pub fn num_obj(&mut self, tag: TypeTag, n: Num) -> ObjRef {
        match tag {
            TypeTag::BOOL => {
                let truthy = match n {
                    Num::Int(v) => v != 0,
                    Num::Uint(v) => v != 0,
                    Num::Float(v) => v != 0.0,
                };
                self.bool_obj(truthy)
            }
            TypeTag::CHAR => self.char_obj(n.as_i64() as u8),
            TypeTag::INT => self.int_obj(n.as_i64() as i32),
            TypeTag::LONG => self.long_obj(n.as_i64()),
            TypeTag::INT8 => self.alloc_obj(tag, Body::Int8(n.as_i64() as i8)),
            TypeTag::UINT8 => self.alloc_obj(tag, Body::Uint8(n.as_i64() as u8)),
            TypeTag::INT16 => self.alloc_obj(tag, Body::Int16(n.as_i64() as i16)),
            TypeTag::UINT16 => self.alloc_obj(tag, Body::Uint16(n.as_i64() as u16)),
            TypeTag::INT32 => self.alloc_obj(tag, Body::Int32(n.as_i64() as i32)),
            TypeTag::UINT32 => self.alloc_obj(tag, Body::Uint32(n.as_i64() as u32)),
            TypeTag::INT64 => self.alloc_obj(tag, Body::Int64(n.as_i64())),
            TypeTag::UINT64 => self.alloc_obj(tag, Body::Uint64(n.as_u64())),
            TypeTag::FLOAT => self.float_obj(n.as_f64() as f32),
            TypeTag::DOUBLE => self.double_obj(n.as_f64()),
            _ => fatal("numeric construction for a non-numeric tag."),
        }
    }

    /// STR object over the given bytes. Short strings are interned:
    /// repeated requests return the identical object.
    pub fn str_obj(&mut self, bytes: &[u8]) -> ObjRef {
        if bytes.len() <= INTERN_STR_LEN {
            let digest = strobj::murmur2_64a(bytes, self.seed);
            if let Some(bucket) = self.interned.get(&digest) {
                for &r in bucket {
                    if strobj::bytes(r) == bytes {
                        return r;
                    }
                }
            }
            let r = self.alloc_obj(
                TypeTag::STR,
                Body::Str(StrBody {
                    bytes: bytes.into(),
                    interned: true,
                }),
            );
            r.obj_mut().head.digest = digest;
            // The interning table holds a strong reference.
            r.inc_ref();
            self.interned.entry(digest).or_default().push(r);
            return r;
        }
        self.alloc_obj(
            TypeTag::STR,
            Body::Str(StrBody {
                bytes: bytes.into(),
                interned: false,
            }),
        )
    }

    pub fn exception_obj(&mut self, msg: &str) -> ObjRef {
        self.alloc_obj(
            TypeTag::EXCEPTION,
            Body::Exception(msg.as_bytes().into()),
        )
    }

    /// VEC object taking ownership of already-counted element
    /// references.
    pub fn vec_obj(&mut self, elements: Vec<ObjRef>) -> ObjRef {
        self.alloc_obj(TypeTag::VEC, Body::Vec(elements))
    }

    /// Empty DICT object.
    pub fn dict_obj(&mut self) -> ObjRef {
        self.alloc_obj(TypeTag::DICT, Body::Dict(DictBody::new()))
    }

    /// User function owning its code.
    pub fn func_obj(&mut self, code: Rc<Code>) -> ObjRef {
        self.alloc_obj(TypeTag::FUNC, Body::Func(FuncBody::Code(code)))
    }

    /// Builtin function referenced by slot id.
    pub fn builtin_obj(&mut self, slot: u32) -> ObjRef {
        self.alloc_obj(TypeTag::FUNC, Body::Func(FuncBody::Builtin(slot)))
    }

    pub fn mod_obj(&mut self, code: Rc<Code>) -> ObjRef {
        self.alloc_obj(TypeTag::MOD, Body::Mod(code))
    }

    /// Struct instance with all fields initialized to NULL.
    pub fn struct_obj(&mut self, tag: TypeTag, meta: Rc<CompoundMeta>) -> ObjRef {
        let null = self.null_obj;
        let fields = vec![null; meta.fields.len()];
        for f in &fields {
            f.inc_ref();
        }
        self.alloc_obj(tag, Body::Struct(StructBody { fields, meta }))
    }

    /// Union instance with no stored value.
    pub fn union_obj(&mut self, tag: TypeTag, meta: Rc<CompoundMeta>) -> ObjRef {
        self.alloc_obj(tag, Body::Union(UnionBody { value: None, meta }))
    }

    /// Default value for a declared type, used by declarations without
    /// an initializer. Compound defaults need the code that owns their
    /// metadata.
    pub fn default_obj(
        &mut self,
        tag: TypeTag,
        meta: Option<Rc<CompoundMeta>>,
    ) -> Result<ObjRef, RuntimeError> {
        Ok(match tag {
            TypeTag::VOID => self.void_obj,
            TypeTag::NULL => self.null_obj,
            TypeTag::BOOL => self.bool_obj(false),
            TypeTag::CHAR => self.char_obj(0),
            TypeTag::INT => self.int_obj(0),
            TypeTag::LONG => self.long_obj(0),
            TypeTag::FLOAT => self.float_obj(0.0),
            TypeTag::DOUBLE => self.double_obj(0.0),
            TypeTag::INT8
            | TypeTag::UINT8
            | TypeTag::INT16
            | TypeTag::UINT16
            | TypeTag::INT32
            | TypeTag::UINT32
            | TypeTag::INT64
            | TypeTag::UINT64 => self.num_obj(tag, Num::Int(0)),
            TypeTag::STR => self.str_obj(b""),
            TypeTag::VEC => self.vec_obj(Vec::new()),
            TypeTag::DICT => self.dict_obj(),
            TypeTag::FUNC => self.alloc_obj(TypeTag::FUNC, Body::Func(FuncBody::Null)),
            TypeTag::EXCEPTION => self.exception_obj(""),
            t if t.is_struct() => {
                let Some(meta) = meta else {
                    return Err(RuntimeError::Type("unknown struct type.".to_string()));
                };
                self.struct_obj(t, meta)
            }
            t if t.is_union() => {
                let Some(meta) = meta else {
                    return Err(RuntimeError::Type("unknown union type.".to_string()));
                };
                self.union_obj(t, meta)
            }
            t => {
                return Err(RuntimeError::Type(format!(
                    "type {t} has no default value."
                )));
            }
        })
    }

    /// Pin a compile-time constant for the heap's lifetime.
    pub fn pin_const(&mut self, r: ObjRef) {
        r.inc_ref();
        self.consts.push(r);
    }

    /// Age the pool's empty pages and release long-empty pools.
    pub fn recycle(&mut self) {
        self.alloc.recycle();
    }

    /// Drop one reference; the object is freed when the count reaches
    /// zero. Immortal singletons ignore this entirely.
    pub fn unref(&mut self, r: ObjRef) {
        if r.obj().head.immortal {
            return;
        }
        r.obj_mut().head.refcnt -= 1;
        if r.obj().head.refcnt <= 0 {
            self.free_now(r);
        }
    }

    /// Release a temporary that never got a reference taken on it.
    /// Objects with live references are left alone.
    pub fn discard(&mut self, r: ObjRef) {
        if r.obj().head.immortal || r.obj().head.refcnt > 0 {
            return;
        }
        self.free_now(r);
    }

    /// Immediately destroy an object: run the type-specific cleanup,
    /// drop child references and return the cell to the pool.
    fn free_now(&mut self, r: ObjRef) {
        self.gc.untrack(r);

        // Interned strings leave the table as they die.
        if let Body::Str(s) = &r.obj().body {
            if s.interned {
                let digest = r.obj().head.digest;
                if let Some(bucket) = self.interned.get_mut(&digest) {
                    bucket.retain(|&e| e != r);
                    if bucket.is_empty() {
                        self.interned.remove(&digest);
                    }
                }
            }
        }

        // Collect child references before the body drops.
        let mut children: Vec<ObjRef> = Vec::new();
        match &r.obj().body {
            Body::Vec(v) => children.extend(v.iter().copied()),
            Body::Dict(d) => d.collect_refs(&mut children),
            Body::Struct(s) => children.extend(s.fields.iter().copied()),
            Body::Union(u) => children.extend(u.value),
            _ => {}
        }

        let ptr = r.as_ptr();
        // SAFETY: the cell is live and owned by this heap; after the
        // drop the memory returns to the pool and is never read again.
        unsafe { ptr::drop_in_place(ptr) };
        self.alloc.free(ptr.cast::<u8>());

        for child in children {
            if child != r {
                self.unref(child);
            }
        }
    }

    /// Release caches, constants and interned strings, then collect
    /// remaining cycles. Called once at thread end.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let consts = std::mem::take(&mut self.consts);
        for r in consts {
            self.unref(r);
        }
        let ints = std::mem::take(&mut self.int_cache);
        for r in ints.iter().copied().flatten() {
            self.unref(r);
        }
        for i in 0..self.char_cache.len() {
            if let Some(r) = self.char_cache[i].take() {
                self.unref(r);
            }
        }
        let interned: Vec<ObjRef> = self.interned.drain().flat_map(|(_, v)| v).collect();
        for r in interned {
            self.unref(r);
        }
        crate::gc::collect_all(self);
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.teardown();
        // Remaining cells fall with their pools.
    }
}
