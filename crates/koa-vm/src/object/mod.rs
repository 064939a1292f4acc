// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The koa object model.
//!
//! Every runtime value is an object cell allocated from the pool: a
//! header (reference count, type tag, memoized digest, collector link)
//! followed by the body, a sum over all runtime variants. [`ObjRef`] is
//! a copyable handle to a cell; ownership is expressed through the
//! reference count, never through Rust ownership of the cell itself.
//!
//! The uniform operation set of the language (arithmetic, comparison,
//! indexing, hashing, serialization, ...) dispatches over the body sum;
//! combinations a type does not support report a `TypeError`.

#[cfg(test)]
mod object_test;

pub mod binary;
pub mod compound;
pub mod copy;
pub mod dictobj;
pub mod numeric;
pub mod strobj;
pub mod vecobj;

use std::ptr::NonNull;
use std::rc::Rc;

use crate::code::{Code, CompoundMeta};
use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::types::TypeTag;

pub use dictobj::DictBody;
pub use numeric::Num;

/// Result type of the polymorphic operations.
pub type OpResult = Result<ObjRef, RuntimeError>;

/// Generation marker: object not registered with the collector.
pub const GC_UNTRACKED: u8 = u8::MAX;
/// Generation marker: object currently in a collection working set.
pub const GC_IN_COLLECT: u8 = u8::MAX - 1;

/// Collector status, only meaningful during a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcStatus {
    Reachable,
    Unreachable,
}

/// Collector bookkeeping embedded in every object header.
#[derive(Debug, Clone, Copy)]
pub struct GcLink {
    /// Generation index, or one of the `GC_*` markers.
    pub gen: u8,
    /// Slot inside the generation (or collection working set).
    pub slot: u32,
    /// Scratch copy of the reference count used during collection.
    pub gc_ref: i32,
    pub status: GcStatus,
}

impl GcLink {
    const fn new() -> Self {
        Self {
            gen: GC_UNTRACKED,
            slot: 0,
            gc_ref: 0,
            status: GcStatus::Reachable,
        }
    }
}

/// Object header.
#[derive(Debug)]
pub struct Head {
    /// Signed reference count. New objects start at zero and are kept
    /// alive by the first reference taken on them.
    pub refcnt: i32,
    /// Immortal objects ignore `unref` entirely (process singletons).
    pub immortal: bool,
    pub tag: TypeTag,
    /// Memoized 64-bit digest; zero means not yet computed.
    pub digest: u64,
    pub gc: GcLink,
}

/// Function body payload.
pub enum FuncBody {
    /// Declared but never assigned; calling it is an error.
    Null,
    /// Builtin identified by its 1-based slot id.
    Builtin(u32),
    /// User function owning its compiled code.
    Code(Rc<Code>),
}

/// Struct payload: one owned slot per declared field.
pub struct StructBody {
    pub fields: Vec<ObjRef>,
    /// Field metadata, owned by the declaring code unit.
    pub meta: Rc<CompoundMeta>,
}

/// Union payload: a single optional owned value.
pub struct UnionBody {
    pub value: Option<ObjRef>,
    pub meta: Rc<CompoundMeta>,
}

/// String payload. Interned strings are additionally indexed by the
/// heap's interning table.
pub struct StrBody {
    pub bytes: Box<[u8]>,
    pub interned: bool,
}

/// The sum of all runtime variants.
pub enum Body {
    Void,
    Null,
    Bool(bool),
    Char(u8),
    Int(i32),
    Long(i64),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Str(StrBody),
    Vec(Vec<ObjRef>),
    Dict(DictBody),
    Func(FuncBody),
    Mod(Rc<Code>),
    /// Reserved: frames are interpreter state, never materialized.
    Frame,
    Exception(Box<[u8]>),
    Struct(StructBody),
    Union(UnionBody),
}

/// One object cell.
pub struct Obj {
    pub head: Head,
    pub body: Body,
}

impl Obj {
    #[must_use]
    pub const fn new(tag: TypeTag, body: Body) -> Self {
        Self {
            head: Head {
                refcnt: 0,
                immortal: false,
                tag,
                digest: 0,
                gc: GcLink::new(),
            },
            body,
        }
    }
}

/// Handle to an object cell.
///
/// Copyable; equality is cell identity. All cells are owned by exactly
/// one thread's heap, and only that thread touches them.
#[derive(Clone, Copy)]
pub struct ObjRef(NonNull<Obj>);

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0.as_ptr(), other.0.as_ptr())
    }
}

impl Eq for ObjRef {}

impl std::hash::Hash for ObjRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0.as_ptr() as usize).hash(state);
    }
}

impl std::fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjRef({} @{:p})", self.tag(), self.0.as_ptr())
    }
}

impl ObjRef {
    /// Wrap a cell pointer.
    #[inline]
    #[must_use]
    pub const fn from_ptr(ptr: NonNull<Obj>) -> Self {
        Self(ptr)
    }

    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> *mut Obj {
        self.0.as_ptr()
    }

    /// Borrow the cell.
    ///
    /// The cell is owned by the current thread's heap; no other borrow
    /// of the same cell may be live while a mutable one exists.
    #[inline]
    #[must_use]
    pub fn obj(&self) -> &Obj {
        // SAFETY: cells live until their refcount releases them, and
        // all access happens on the owning thread.
        unsafe { self.0.as_ref() }
    }

    /// Mutably borrow the cell. See [`ObjRef::obj`] for the discipline.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn obj_mut(&self) -> &mut Obj {
        // SAFETY: see `obj`; the VM never holds two borrows of one cell.
        unsafe { &mut *self.0.as_ptr() }
    }

    #[inline]
    #[must_use]
    pub fn tag(self) -> TypeTag {
        self.obj().head.tag
    }

    #[inline]
    #[must_use]
    pub fn refcnt(self) -> i32 {
        self.obj().head.refcnt
    }

    #[inline]
    #[must_use]
    pub fn is_immortal(self) -> bool {
        self.obj().head.immortal
    }

    /// Take a reference on the object.
    #[inline]
    pub fn inc_ref(self) {
        self.obj_mut().head.refcnt += 1;
    }

    /// Drop a reference without freeing; the caller guarantees the
    /// count stays positive or the object is released elsewhere.
    #[inline]
    pub fn dec_ref_only(self) {
        self.obj_mut().head.refcnt -= 1;
    }

    #[inline]
    #[must_use]
    pub fn is_void(self) -> bool {
        self.tag() == TypeTag::VOID
    }

    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self.tag() == TypeTag::NULL
    }
}

/// Widened integer value of any integer-typed object (BOOL and CHAR
/// participate as integers). Unsigned 64-bit values keep their bits.
#[must_use]
pub fn get_integer(r: ObjRef) -> i64 {
    match &r.obj().body {
        Body::Bool(b) => i64::from(*b),
        Body::Char(c) => i64::from(*c),
        Body::Int(v) | Body::Int32(v) => i64::from(*v),
        Body::Long(v) | Body::Int64(v) => *v,
        Body::Int8(v) => i64::from(*v),
        Body::Uint8(v) => i64::from(*v),
        Body::Int16(v) => i64::from(*v),
        Body::Uint16(v) => i64::from(*v),
        Body::Uint32(v) => i64::from(*v),
        Body::Uint64(v) => *v as i64,
        _ => 0,
    }
}

/// Floating value of a FLOAT or DOUBLE object.
#[must_use]
pub fn get_floating(r: ObjRef) -> f64 {
    match &r.obj().body {
        Body::Float(v) => f64::from(*v),
        Body::Double(v) => *v,
        _ => 0.0,
    }
}

/// Widened numeric value of any numeric object.
#[must_use]
pub fn get_num(r: ObjRef) -> Num {
    match &r.obj().body {
        Body::Float(v) => Num::Float(f64::from(*v)),
        Body::Double(v) => Num::Float(*v),
        Body::Uint64(v) => Num::Uint(*v),
        _ => Num::Int(get_integer(r)),
    }
}

/// Condition test: zero-valued numerics and null are false.
pub fn is_zero(r: ObjRef) -> Result<bool, RuntimeError> {
    match &r.obj().body {
        Body::Null => Ok(true),
        Body::Bool(b) => Ok(!*b),
        Body::Float(v) => Ok(*v == 0.0),
        Body::Double(v) => Ok(*v == 0.0),
        _ if r.tag().is_integer() => Ok(get_integer(r) == 0),
        _ => Err(RuntimeError::Type(format!(
            "invalid operand type {} for condition.",
            r.tag()
        ))),
    }
}

/// Cast an object to another type. Only numeric casts are defined;
/// identical-type casts produce a fresh equal object.
pub fn cast(heap: &mut Heap, r: ObjRef, target: TypeTag) -> OpResult {
    let tag = r.tag();
    if tag == target {
        return Ok(r);
    }
    if !tag.is_numeric() || !target.is_numeric() {
        return Err(RuntimeError::Type(format!(
            "cannot cast {} to {}.",
            tag, target
        )));
    }
    Ok(heap.num_obj(target, get_num(r)))
}

/// Logical not: non-zero becomes false, zero becomes true.
pub fn logic_not(heap: &mut Heap, r: ObjRef) -> OpResult {
    if !r.tag().is_numeric() && !r.is_null() {
        return Err(RuntimeError::Type(format!(
            "invalid operand type {} for '!'.",
            r.tag()
        )));
    }
    Ok(heap.bool_obj(is_zero(r)?))
}

/// Arithmetic negation.
pub fn neg(heap: &mut Heap, r: ObjRef) -> OpResult {
    if !r.tag().is_numeric() {
        return Err(RuntimeError::Type(format!(
            "invalid operand type {} for '-'.",
            r.tag()
        )));
    }
    numeric::neg(heap, r)
}

/// Bitwise not. Integer operands only; BOOL and CHAR widen to INT.
pub fn bit_not(heap: &mut Heap, r: ObjRef) -> OpResult {
    if !r.tag().is_integer() {
        return Err(RuntimeError::Type(format!(
            "invalid operand type {} for '~'.",
            r.tag()
        )));
    }
    numeric::bit_not(heap, r)
}

/// Addition. STR concatenates, VEC concatenates, numerics promote.
pub fn add(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    if a.tag() == TypeTag::STR {
        return strobj::concat(heap, a, b);
    }
    if a.tag() == TypeTag::VEC {
        if b.tag() != TypeTag::VEC {
            return Err(RuntimeError::Type(format!(
                "invalid right operand type {} for '+'.",
                b.tag()
            )));
        }
        return vecobj::concat(heap, a, b);
    }
    numeric::binop(heap, a, b, numeric::BinOp::Add, "+")
}

pub fn sub(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::binop(heap, a, b, numeric::BinOp::Sub, "-")
}

pub fn mul(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::binop(heap, a, b, numeric::BinOp::Mul, "*")
}

/// Division; a zero right operand raises `division by zero`.
pub fn div(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::check_operands(a, b, "/")?;
    if is_zero(b)? {
        return Err(RuntimeError::ZeroDivision);
    }
    numeric::binop(heap, a, b, numeric::BinOp::Div, "/")
}

/// Modulus; a zero right operand raises `division by zero`.
pub fn rem(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::check_operands(a, b, "%")?;
    if is_zero(b)? {
        return Err(RuntimeError::ZeroDivision);
    }
    numeric::binop(heap, a, b, numeric::BinOp::Mod, "%")
}

pub fn bit_and(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::int_binop(heap, a, b, numeric::BinOp::And, "&")
}

pub fn bit_or(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::int_binop(heap, a, b, numeric::BinOp::Or, "|")
}

pub fn bit_xor(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::int_binop(heap, a, b, numeric::BinOp::Xor, "^")
}

/// Logical and over numeric operands; both sides already evaluated.
pub fn logic_and(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::check_operands(a, b, "&&")?;
    Ok(heap.bool_obj(!is_zero(a)? && !is_zero(b)?))
}

/// Logical or over numeric operands; both sides already evaluated.
pub fn logic_or(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::check_operands(a, b, "||")?;
    Ok(heap.bool_obj(!is_zero(a)? || !is_zero(b)?))
}

/// Left shift. The left operand widens to at least INT; the right
/// operand's integer value is the shift count.
pub fn left_shift(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::shift(heap, a, b, false, "<<")
}

/// Right shift, arithmetic for signed and logical for unsigned types.
pub fn right_shift(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    numeric::shift(heap, a, b, true, ">>")
}

/// Equality.
///
/// `null == null` is true and `null == x` is false for non-null `x`;
/// identity implies equality; numeric pairs compare arithmetic value
/// after coercion; STR compares bytes.
pub fn eq(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    Ok(heap.bool_obj(value_eq(a, b)?))
}

/// Raw equality test shared by `eq` and the dict probe loop.
pub fn value_eq(a: ObjRef, b: ObjRef) -> Result<bool, RuntimeError> {
    if a == b {
        return Ok(true);
    }
    if a.is_null() || b.is_null() {
        return Ok(a.is_null() && b.is_null());
    }
    if a.tag().is_numeric() && b.tag().is_numeric() {
        return Ok(numeric::compare(a, b) == std::cmp::Ordering::Equal);
    }
    if a.tag() == TypeTag::STR && b.tag() == TypeTag::STR {
        return Ok(strobj::bytes(a) == strobj::bytes(b));
    }
    if a.tag() == TypeTag::VEC && b.tag() == TypeTag::VEC {
        return vecobj::elements_eq(a, b);
    }
    if a.tag() == TypeTag::FUNC && b.tag() == TypeTag::FUNC {
        return Ok(match (&a.obj().body, &b.obj().body) {
            (Body::Func(FuncBody::Builtin(x)), Body::Func(FuncBody::Builtin(y))) => x == y,
            (Body::Func(FuncBody::Code(x)), Body::Func(FuncBody::Code(y))) => Rc::ptr_eq(x, y),
            _ => false,
        });
    }
    if a.tag() == TypeTag::EXCEPTION && b.tag() == TypeTag::EXCEPTION {
        return Ok(match (&a.obj().body, &b.obj().body) {
            (Body::Exception(x), Body::Exception(y)) => x == y,
            _ => false,
        });
    }
    if a.tag() == b.tag() {
        // Same-typed containers without deeper equality: identity only.
        return Ok(false);
    }
    Err(RuntimeError::Type(format!(
        "invalid operand types {} and {} for '=='.",
        a.tag(),
        b.tag()
    )))
}

/// Three-way comparison, `-1`, `0` or `+1` as an INT object.
///
/// Defined for numeric pairs and STR-STR.
pub fn compare(heap: &mut Heap, a: ObjRef, b: ObjRef) -> OpResult {
    let ord = if a.tag() == TypeTag::STR && b.tag() == TypeTag::STR {
        strobj::bytes(a).cmp(strobj::bytes(b))
    } else if a.tag().is_numeric() && b.tag().is_numeric() {
        numeric::compare(a, b)
    } else {
        return Err(RuntimeError::Type(format!(
            "invalid operand types {} and {} for comparation.",
            a.tag(),
            b.tag()
        )));
    };
    Ok(heap.int_obj(match ord {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

/// Subscript read.
pub fn index(heap: &mut Heap, container: ObjRef, key: ObjRef) -> OpResult {
    match container.tag() {
        TypeTag::VEC => vecobj::index(container, key),
        TypeTag::DICT => dictobj::index(heap, container, key),
        TypeTag::STR => strobj::index(heap, container, key),
        t => Err(RuntimeError::Type(format!(
            "left operand {t} has no index routine."
        ))),
    }
}

/// Subscript write. Takes a reference on the stored value (and on a
/// newly inserted dict key), drops the reference of any replaced value,
/// and returns the stored value.
pub fn ipindex(heap: &mut Heap, container: ObjRef, key: ObjRef, value: ObjRef) -> OpResult {
    match container.tag() {
        TypeTag::VEC => vecobj::ipindex(heap, container, key, value),
        TypeTag::DICT => dictobj::ipindex(heap, container, key, value),
        t => Err(RuntimeError::Type(format!(
            "left operand {t} has no inplace index routine."
        ))),
    }
}

/// Element or byte count.
pub fn len(heap: &mut Heap, r: ObjRef) -> OpResult {
    let n = match &r.obj().body {
        Body::Str(s) => s.bytes.len(),
        Body::Vec(v) => v.len(),
        Body::Dict(d) => d.len(),
        Body::Struct(s) => s.fields.len(),
        _ => {
            return Err(RuntimeError::Type(format!(
                "type {} has no len routine.",
                r.tag()
            )));
        }
    };
    Ok(heap.long_obj(n as i64))
}

/// The hash operation: the object digest as a LONG object.
pub fn hash(heap: &mut Heap, r: ObjRef) -> OpResult {
    let d = digest(heap, r);
    Ok(heap.long_obj(d as i64))
}

/// Memoized 64-bit digest of an object.
///
/// Integers use the MurmurHash3 finalizer; floats hash as the equal
/// integer when integral so that `3` and `3.0` collide as dict keys;
/// strings use seeded MurmurHash2-64A; everything else hashes by cell
/// address. Once computed the digest never changes.
pub fn digest(heap: &Heap, r: ObjRef) -> u64 {
    let cached = r.obj().head.digest;
    if cached != 0 {
        return cached;
    }
    let d = match &r.obj().body {
        Body::Null => integer_hash(0),
        Body::Float(_) | Body::Double(_) => floating_hash(get_floating(r)),
        Body::Str(s) => strobj::murmur2_64a(&s.bytes, heap.str_seed()),
        _ if r.tag().is_integer() => integer_hash(get_integer(r)),
        _ => address_hash(r.as_ptr() as usize),
    };
    r.obj_mut().head.digest = d;
    d
}

/// MurmurHash3 64-bit finalizer.
#[must_use]
pub fn integer_hash(val: i64) -> u64 {
    let mut h = val as u64;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// Digest of a floating value, aligned with the equal integer's digest.
#[must_use]
pub fn floating_hash(val: f64) -> u64 {
    const INFINITY_NEG: i64 = -271_828;
    const INFINITY_POS: i64 = 314_159;

    let to_hash = if val.is_nan() {
        0
    } else if val.is_infinite() {
        if val < 0.0 { INFINITY_NEG } else { INFINITY_POS }
    } else if val.fract() == 0.0 {
        // Equal integral values must collide across numeric types.
        val as i64
    } else {
        val.to_bits() as i64
    };
    integer_hash(to_hash)
}

/// Address-based digest for identity-hashed containers.
#[must_use]
pub fn address_hash(addr: usize) -> u64 {
    integer_hash(addr as i64)
}

/// Plain rendering, used by the `print` builtin.
#[must_use]
pub fn print_str(r: ObjRef) -> String {
    match &r.obj().body {
        Body::Void => "<void>".to_string(),
        Body::Null => "null".to_string(),
        Body::Bool(b) => b.to_string(),
        Body::Char(c) => (*c as char).to_string(),
        Body::Int(v) | Body::Int32(v) => v.to_string(),
        Body::Long(v) | Body::Int64(v) => v.to_string(),
        Body::Int8(v) => v.to_string(),
        Body::Uint8(v) => v.to_string(),
        Body::Int16(v) => v.to_string(),
        Body::Uint16(v) => v.to_string(),
        Body::Uint32(v) => v.to_string(),
        Body::Uint64(v) => v.to_string(),
        Body::Float(v) => v.to_string(),
        Body::Double(v) => v.to_string(),
        Body::Str(s) => format!("\"{}\"", String::from_utf8_lossy(&s.bytes)),
        Body::Vec(v) => {
            let elems: Vec<String> = v.iter().map(|e| print_str(*e)).collect();
            format!("[{}]", elems.join(", "))
        }
        Body::Dict(d) => {
            let pairs: Vec<String> = d
                .iter()
                .map(|(k, v)| format!("{}: {}", print_str(k), print_str(v)))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        }
        Body::Func(FuncBody::Null) => "<null func>".to_string(),
        Body::Func(FuncBody::Builtin(slot)) => format!("<builtin {slot}>"),
        Body::Func(FuncBody::Code(code)) => format!("<func {}>", code.name()),
        Body::Mod(code) => format!("<mod {}>", code.name()),
        Body::Frame => "<frame>".to_string(),
        Body::Exception(msg) => {
            format!("<exception \"{}\">", String::from_utf8_lossy(msg))
        }
        Body::Struct(s) => format!("<struct {}>", s.meta.name),
        Body::Union(u) => format!("<union {}>", u.meta.name),
    }
}

/// Diagnostic rendering with the type spelled out.
#[must_use]
pub fn dump_str(r: ObjRef) -> String {
    match &r.obj().body {
        Body::Void => "<dummy>".to_string(),
        Body::Null => "<null>".to_string(),
        Body::Char(c) => format!("<char '{}'>", *c as char),
        Body::Str(s) => format!("<str \"{}\">", String::from_utf8_lossy(&s.bytes)),
        Body::Exception(_) | Body::Func(_) | Body::Mod(_) => print_str(r),
        _ => format!("<{} {}>", r.tag(), print_str(r)),
    }
}

/// Invoke `f` on every owned child reference of a trackable container.
/// When `f` returns true the child slot is replaced with the VOID dummy
/// (used by the collector to break cycles during teardown).
///
/// No borrow of the container is held while `f` runs, so the callback
/// may touch any cell, including the container itself (self-cycles).
pub fn traverse<F: FnMut(ObjRef) -> bool>(r: ObjRef, void: ObjRef, f: &mut F) {
    match r.tag() {
        TypeTag::VEC => {
            let len = match &r.obj().body {
                Body::Vec(v) => v.len(),
                _ => 0,
            };
            for i in 0..len {
                let child = match &r.obj().body {
                    Body::Vec(v) => v[i],
                    _ => break,
                };
                if f(child) {
                    if let Body::Vec(v) = &mut r.obj_mut().body {
                        v[i] = void;
                    }
                }
            }
        }
        TypeTag::DICT => {
            let slots = match &r.obj().body {
                Body::Dict(d) => d.slot_count(),
                _ => 0,
            };
            for i in 0..slots {
                let child = match &r.obj().body {
                    Body::Dict(d) => d.value_at(i),
                    _ => None,
                };
                let Some(child) = child else { continue };
                if f(child) {
                    if let Body::Dict(d) = &mut r.obj_mut().body {
                        d.replace_value_at(i, void);
                    }
                }
            }
        }
        t if t.is_struct() => {
            let len = match &r.obj().body {
                Body::Struct(s) => s.fields.len(),
                _ => 0,
            };
            for i in 0..len {
                let child = match &r.obj().body {
                    Body::Struct(s) => s.fields[i],
                    _ => break,
                };
                if f(child) {
                    if let Body::Struct(s) = &mut r.obj_mut().body {
                        s.fields[i] = void;
                    }
                }
            }
        }
        t if t.is_union() => {
            let child = match &r.obj().body {
                Body::Union(u) => u.value,
                _ => None,
            };
            if let Some(child) = child {
                if f(child) {
                    if let Body::Union(u) = &mut r.obj_mut().body {
                        u.value = Some(void);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Compiled code of a user FUNC object, `None` for builtins.
#[must_use]
pub fn func_code(r: ObjRef) -> Option<Rc<Code>> {
    match &r.obj().body {
        Body::Func(FuncBody::Code(code)) => Some(Rc::clone(code)),
        _ => None,
    }
}

/// Builtin slot id of a FUNC object, `None` for user functions.
#[must_use]
pub fn func_builtin(r: ObjRef) -> Option<u32> {
    match &r.obj().body {
        Body::Func(FuncBody::Builtin(slot)) => Some(*slot),
        _ => None,
    }
}

/// Message text of an EXCEPTION object.
#[must_use]
pub fn exception_message(r: ObjRef) -> String {
    match &r.obj().body {
        Body::Exception(msg) => String::from_utf8_lossy(msg).into_owned(),
        _ => String::new(),
    }
}
