// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode binary format.
//!
//! A compiled `.k` module can be cached next to the source as a `.b`
//! file and loaded back without re-parsing. The format mirrors object
//! serialization: a code unit starts with its name, filename, return
//! type, function flag and first line, followed by counted sections
//! for opcodes, line info, constants, varnames, nested codes and
//! struct/union metas.
//!
//! All counts and lengths are native-endian machine words; `.b` files
//! are self-consistent but not portable across architectures.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::heap::Heap;
use crate::object::binary as objbin;
use crate::types::TypeTag;

use super::{unpack_op, Code, CompoundMeta, VarInfo};

/// Errors while reading a binary image.
#[derive(Debug, Error)]
pub enum BinaryError {
    #[error("unexpected end of binary image.")]
    UnexpectedEof,
    #[error("unknown type tag {0} in binary image.")]
    BadTag(i32),
    #[error("unknown opcode in instruction {0:#010x}.")]
    BadOpcode(u32),
    #[error("malformed binary image: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Cursor over a binary image.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Remaining unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], BinaryError> {
        if self.remaining() < n {
            return Err(BinaryError::UnexpectedEof);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> Result<u8, BinaryError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, BinaryError> {
        let b = self.take(4)?;
        Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, BinaryError> {
        let b = self.take(4)?;
        Ok(i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, BinaryError> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_ne_bytes(a))
    }

    pub fn read_usize(&mut self) -> Result<usize, BinaryError> {
        let b = self.take(std::mem::size_of::<usize>())?;
        let mut a = [0u8; std::mem::size_of::<usize>()];
        a.copy_from_slice(b);
        Ok(usize::from_ne_bytes(a))
    }

    pub fn read_str(&mut self) -> Result<String, BinaryError> {
        let len = self.read_usize()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| BinaryError::Malformed("non-utf8 name in binary image"))
    }
}

/// Write a machine word.
pub fn put_usize(out: &mut Vec<u8>, v: usize) {
    out.extend_from_slice(&v.to_ne_bytes());
}

pub fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

pub fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_ne_bytes());
}

pub fn put_str(out: &mut Vec<u8>, s: &str) {
    put_usize(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

/// Serialize a code unit.
pub fn write_code(code: &Code, out: &mut Vec<u8>) {
    put_str(out, &code.name);
    put_str(out, &code.filename);
    put_i32(out, code.ret_type.0);
    put_i32(out, i32::from(code.fun));
    put_u32(out, code.lineno);

    put_usize(out, code.opcodes.len());
    for &w in &code.opcodes {
        put_u32(out, w);
    }
    put_usize(out, code.lineinfo.len());
    for &l in &code.lineinfo {
        put_u32(out, l);
    }
    put_usize(out, code.consts.len());
    for &c in &code.consts {
        objbin::write_obj(c, out);
    }
    put_usize(out, code.varnames.len());
    for v in &code.varnames {
        put_str(out, &v.name);
        put_i32(out, v.ty.0);
        put_i32(out, i32::from(v.is_param));
    }
    put_usize(out, code.subs.len());
    for sub in &code.subs {
        write_code(sub, out);
    }
    write_metas(&code.struct_metas, out);
    write_metas(&code.union_metas, out);
}

/// Serialize a meta table (also used for the thread spawn image).
pub fn write_metas(metas: &[Rc<CompoundMeta>], out: &mut Vec<u8>) {
    put_usize(out, metas.len());
    for meta in metas {
        put_i32(out, meta.tag.0);
        put_str(out, &meta.name);
        put_usize(out, meta.fields.len());
        for (name, ty) in &meta.fields {
            put_str(out, name);
            put_i32(out, ty.0);
        }
    }
}

/// Deserialize a code unit, creating its constants in `heap`.
pub fn read_code(heap: &mut Heap, r: &mut ByteReader<'_>) -> Result<Code, BinaryError> {
    let name = r.read_str()?;
    let filename = r.read_str()?;
    let ret_type = TypeTag(r.read_i32()?);
    let fun = r.read_i32()? != 0;
    let lineno = r.read_u32()?;

    let mut code = Code::new(&filename, &name);
    code.fun = fun;
    code.lineno = lineno;
    code.ret_type = ret_type;

    let n_ops = r.read_usize()?;
    for _ in 0..n_ops {
        let w = r.read_u32()?;
        if unpack_op(w).is_none() {
            return Err(BinaryError::BadOpcode(w));
        }
        code.opcodes.push(w);
    }
    let n_lines = r.read_usize()?;
    for _ in 0..n_lines {
        code.lineinfo.push(r.read_u32()?);
    }
    let n_consts = r.read_usize()?;
    for _ in 0..n_consts {
        let obj = objbin::read_obj(heap, r, None)?;
        heap.pin_const(obj);
        code.consts.push(obj);
    }
    let n_vars = r.read_usize()?;
    for _ in 0..n_vars {
        let vname = r.read_str()?;
        let ty = TypeTag(r.read_i32()?);
        let is_param = r.read_i32()? != 0;
        if is_param {
            code.arg_count += 1;
        }
        code.varnames.push(VarInfo {
            name: vname,
            ty,
            is_param,
        });
    }
    let n_subs = r.read_usize()?;
    for _ in 0..n_subs {
        code.subs.push(Rc::new(read_code(heap, r)?));
    }
    code.struct_metas = read_metas(r)?;
    code.union_metas = read_metas(r)?;

    Ok(code)
}

/// Deserialize a meta table.
pub fn read_metas(r: &mut ByteReader<'_>) -> Result<Vec<Rc<CompoundMeta>>, BinaryError> {
    let n = r.read_usize()?;
    let mut metas = Vec::with_capacity(n);
    for _ in 0..n {
        let tag = TypeTag(r.read_i32()?);
        let name = r.read_str()?;
        let n_fields = r.read_usize()?;
        let mut fields = Vec::with_capacity(n_fields);
        for _ in 0..n_fields {
            let fname = r.read_str()?;
            let fty = TypeTag(r.read_i32()?);
            fields.push((fname, fty));
        }
        metas.push(Rc::new(CompoundMeta { tag, name, fields }));
    }
    Ok(metas)
}

/// Path of the cache next to a `.k` source.
#[must_use]
pub fn cache_path(source: &Path) -> PathBuf {
    source.with_extension("b")
}

/// Write the compiled module next to its source.
pub fn save_cache(code: &Code, source: &Path) -> Result<(), BinaryError> {
    let mut out = Vec::new();
    write_code(code, &mut out);
    let path = cache_path(source);
    fs::write(&path, out)?;
    debug!(path = %path.display(), "wrote bytecode cache");
    Ok(())
}

/// Load the cached module for `source` if the cache exists, is
/// accessible and is newer than the source.
pub fn load_cache(heap: &mut Heap, source: &Path) -> Option<Code> {
    let path = cache_path(source);
    let cache_meta = fs::metadata(&path).ok()?;
    let src_meta = fs::metadata(source).ok()?;
    let (cache_time, src_time) = (cache_meta.modified().ok()?, src_meta.modified().ok()?);
    if cache_time <= src_time {
        return None;
    }
    let buf = fs::read(&path).ok()?;
    let mut reader = ByteReader::new(&buf);
    match read_code(heap, &mut reader) {
        Ok(code) => {
            debug!(path = %path.display(), "loaded bytecode cache");
            Some(code)
        }
        Err(err) => {
            debug!(path = %path.display(), %err, "ignoring stale bytecode cache");
            None
        }
    }
}
