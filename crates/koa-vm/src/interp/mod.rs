// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode interpreter.
//!
//! A straight fetch-decode-execute loop over the per-thread value
//! stack and the frame chain. Calls to user functions recurse into the
//! loop with a fresh frame; returns pop it. A failing opcode raises:
//! the stack unwinds block by block, then frame by frame, to the
//! nearest catching block, and an uncaught exception prints a
//! traceback.
//!
//! Every `LEAVE_BLOCK` is a collection point, and a tick fires every
//! 1000 opcodes regardless of block activity, bounding worst-case
//! cycle retention.


use std::cmp::Ordering;
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::builtins;
use crate::code::{Code, CompoundMeta, Op, Para};
use crate::error::RuntimeError;
use crate::frame::Frame;
use crate::gc;
use crate::heap::Heap;
use crate::object::{self, compound, copy, ObjRef, OpResult};
use crate::thread::ThreadTable;
use crate::types::TypeTag;

/// Opcodes between forced collection ticks.
const GC_OP_COUNT: u32 = 1000;

/// Flow control of one executed opcode.
enum Flow {
    Continue,
    /// The current frame finished (RETURN or END_PROGRAM).
    Return,
}

/// An in-flight exception or a terminal failure.
pub enum VmError {
    /// Exception object unwinding toward a catching block.
    Raise(ObjRef),
    /// No catching block exists; the traceback is already printed.
    Uncaught(RuntimeError),
}

/// One thread's interpreter state.
pub struct Interp {
    pub heap: Heap,
    /// Value stack; every slot holds one reference.
    pub stack: Vec<ObjRef>,
    /// Frame chain; index 0 is the global frame.
    pub frames: Vec<Frame>,
    /// The module code, for compound metadata and thread spawns.
    pub global_code: Option<Rc<Code>>,
    pub threads: ThreadTable,
    /// Worker threads copy constants on load.
    pub is_worker: bool,
    /// REPL mode: errors roll back to the top frame and resume.
    pub cmdline: bool,
    out: Box<dyn Write>,
    gc_op_count: u32,
}

impl Interp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_output(Box::new(std::io::stdout()))
    }

    /// Interpreter writing program output to the given sink.
    #[must_use]
    pub fn with_output(out: Box<dyn Write>) -> Self {
        Self::build(Heap::new(), out)
    }

    /// Interpreter for a worker thread over a pre-built heap.
    #[must_use]
    pub fn worker(heap: Heap) -> Self {
        let mut interp = Self::build(heap, Box::new(std::io::stdout()));
        interp.is_worker = true;
        interp
    }

    fn build(heap: Heap, out: Box<dyn Write>) -> Self {
        Self {
            heap,
            stack: Vec::new(),
            frames: Vec::new(),
            global_code: None,
            threads: ThreadTable::new(),
            is_worker: false,
            cmdline: false,
            out,
            gc_op_count: 0,
        }
    }

    /// Write program output.
    pub fn write_out(&mut self, s: &str) {
        let _ = self.out.write_all(s.as_bytes());
    }

    pub fn flush_out(&mut self) {
        let _ = self.out.flush();
    }

    /// Push a value, taking a reference on it.
    pub fn push(&mut self, r: ObjRef) {
        r.inc_ref();
        self.stack.push(r);
    }

    /// Push a value whose reference is transferred by the caller.
    pub fn push_owned(&mut self, r: ObjRef) {
        self.stack.push(r);
    }

    /// Pop a value; the caller owns its stack reference.
    pub fn pop(&mut self) -> Option<ObjRef> {
        self.stack.pop()
    }

    fn pop_must(&mut self) -> Result<ObjRef, VmError> {
        match self.stack.pop() {
            Some(r) => Ok(r),
            None => Err(self.raise(RuntimeError::Type("value stack underflow.".to_string()))),
        }
    }

    /// Drop stack entries above `depth`, releasing their references.
    pub fn stack_discard_to(&mut self, depth: usize) {
        while self.stack.len() > depth {
            if let Some(r) = self.stack.pop() {
                self.heap.unref(r);
            }
        }
    }

    /// Run a compiled module to completion. Returns the process exit
    /// status: zero on success, nonzero after an uncaught exception.
    pub fn execute_module(&mut self, code: Rc<Code>) -> i32 {
        self.global_code = Some(Rc::clone(&code));
        self.frames.push(Frame::new(code, self.stack.len(), true, false));
        let status = match self.play() {
            Ok(()) => 0,
            Err(_) => 1,
        };
        self.cleanup();
        status
    }

    /// Worker-thread entry: run `code` over the argument vector and
    /// hand back the return value, still referenced.
    pub fn run_thread(&mut self, code: Rc<Code>, args: ObjRef) -> Option<ObjRef> {
        self.global_code = Some(Rc::clone(&code));
        self.frames.push(Frame::new(code, self.stack.len(), true, false));
        self.push(args);
        let ret = match self.play() {
            Ok(()) => self.pop(),
            Err(_) => None,
        };
        self.cleanup();
        ret
    }

    /// Release all frames, roll the stack back and collect.
    fn cleanup(&mut self) {
        while let Some(mut frame) = self.frames.pop() {
            frame.release(&mut self.heap);
        }
        self.stack_discard_to(0);
        gc::collect_all(&mut self.heap);
        self.flush_out();
    }

    fn current(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(f) => f,
            None => crate::error::fatal("no active frame."),
        }
    }

    /// Execute until the current frame returns or the opcode stream of
    /// the global frame runs dry (REPL statement boundary).
    pub fn play(&mut self) -> Result<(), VmError> {
        loop {
            self.gc_op_count += 1;
            if self.gc_op_count > GC_OP_COUNT {
                self.gc_op_count = 0;
                gc::collect(&mut self.heap);
                self.heap.recycle();
            }

            let fetched = self.current().next_opcode();
            let Some((op, para, _line)) = fetched else {
                if self.frames.len() == 1 {
                    // Module or REPL statement ran off the end.
                    return Ok(());
                }
                let e = RuntimeError::ReturnType(
                    "non-void func fell through without return.".to_string(),
                );
                let ve = self.raise(e);
                self.handle_error(ve)?;
                continue;
            };

            match self.step(op, para) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return) => return Ok(()),
                Err(ve) => self.handle_error(ve)?,
            }
        }
    }

    /// Materialize an error as an exception and decide its fate.
    fn raise(&mut self, e: RuntimeError) -> VmError {
        if self.frames.iter().any(Frame::is_catched) {
            let exc = self.heap.exception_obj(&e.to_string());
            return VmError::Raise(exc);
        }
        self.print_traceback(&e);
        VmError::Uncaught(e)
    }

    fn print_traceback(&mut self, e: &RuntimeError) {
        self.flush_out();
        eprintln!("Traceback:");
        for frame in self.frames.iter().rev() {
            eprint!("{}", frame.traceback_line());
        }
        eprintln!("runtime error: {e}");
    }

    /// Recover in the current frame, or pop it and keep unwinding.
    fn handle_error(&mut self, ve: VmError) -> Result<(), VmError> {
        match ve {
            VmError::Raise(exc) => {
                let recovered = {
                    let heap = &mut self.heap;
                    self.frames.last_mut().and_then(|f| f.recover(heap))
                };
                if let Some((bottom, out)) = recovered {
                    self.stack_discard_to(bottom);
                    self.push(exc);
                    self.current().jump(out);
                    Ok(())
                } else {
                    let bottom = self.current().bottom;
                    self.stack_discard_to(bottom);
                    if let Some(mut frame) = self.frames.pop() {
                        frame.release(&mut self.heap);
                    }
                    if self.frames.is_empty() {
                        let msg = object::exception_message(exc);
                        self.heap.discard(exc);
                        return Err(VmError::Uncaught(RuntimeError::Type(msg)));
                    }
                    Err(VmError::Raise(exc))
                }
            }
            VmError::Uncaught(e) => {
                if self.frames.len() > 1 {
                    // Unwind the dead frame and keep propagating.
                    let bottom = self.frames.last().map_or(0, |f| f.bottom);
                    self.stack_discard_to(bottom);
                    if let Some(mut frame) = self.frames.pop() {
                        frame.release(&mut self.heap);
                    }
                    return Err(VmError::Uncaught(e));
                }
                if self.cmdline && self.frames.len() == 1 {
                    // REPL: roll the stack back to the top frame's base
                    // and resume at the prompt.
                    let bottom = self.frames[0].bottom;
                    self.stack_discard_to(bottom);
                    while self.frames[0].blocks.len() > 1 {
                        let heap = &mut self.heap;
                        let _ = self.frames[0].leave_block(heap);
                    }
                    let end = self.frames[0].code.current_pos() as usize;
                    self.frames[0].ip = end;
                    return Ok(());
                }
                Err(VmError::Uncaught(e))
            }
        }
    }

    /// Compound metadata for a tag, from the current frame's code or
    /// the module code.
    #[must_use]
    pub fn resolve_meta(&self, tag: TypeTag) -> Option<Rc<CompoundMeta>> {
        if let Some(frame) = self.frames.last() {
            if let Some(meta) = frame.code.find_compound(tag) {
                return Some(meta);
            }
        }
        self.global_code
            .as_ref()
            .and_then(|c| c.find_compound(tag))
    }

    /// Variable lookup: current frame blocks, then the global block,
    /// then the builtin table.
    fn lookup_var(&mut self, name: &str) -> Result<ObjRef, RuntimeError> {
        let found = {
            let n = self.frames.len();
            if n == 0 {
                None
            } else if n == 1 {
                self.frames[0].get_var(name)
            } else {
                let current = &self.frames[n - 1];
                current
                    .get_var(name)
                    .or_else(|| self.frames[0].get_var_global(name))
            }
        };
        if let Some(r) = found {
            return Ok(r);
        }
        if let Some(slot) = builtins::find(name) {
            return Ok(self.heap.builtin_obj(slot.id));
        }
        Err(RuntimeError::Name(format!("variable undefined: {name}.")))
    }

    /// Assignment through the block chain; drops the replaced value's
    /// reference.
    fn assign_var(&mut self, name: &str, value: ObjRef) -> Result<(), RuntimeError> {
        if self.frames.len() == 1 {
            if let Some(prev) = self.frames[0].store_var(&mut self.heap, name, value)? {
                self.heap.unref(prev);
                return Ok(());
            }
        } else if let Some((global, rest)) = self.frames.split_first_mut() {
            if let Some(current) = rest.last_mut() {
                if let Some(prev) = current.store_var(&mut self.heap, name, value)? {
                    self.heap.unref(prev);
                    return Ok(());
                }
            }
            if let Some(prev) = global.store_var_global(&mut self.heap, name, value)? {
                self.heap.unref(prev);
                return Ok(());
            }
        }
        Err(RuntimeError::Name(format!("variable undefined: {name}.")))
    }

    fn varname(&mut self, para: Para) -> Result<(String, TypeTag), VmError> {
        let info = self
            .frames
            .last()
            .and_then(|f| f.code.varname(para))
            .map(|v| (v.name.clone(), v.ty));
        match info {
            Some(pair) => Ok(pair),
            None => Err(self.raise(RuntimeError::Name("unknown variable slot.".to_string()))),
        }
    }

    fn rt<T>(&mut self, res: Result<T, RuntimeError>) -> Result<T, VmError> {
        match res {
            Ok(v) => Ok(v),
            Err(e) => Err(self.raise(e)),
        }
    }

    // ----- opcode helpers -------------------------------------------------

    fn exec_unary(&mut self, f: fn(&mut Heap, ObjRef) -> OpResult) -> Result<(), VmError> {
        let a = self.pop_must()?;
        match f(&mut self.heap, a) {
            Ok(r) => {
                self.push(r);
                self.heap.unref(a);
                Ok(())
            }
            Err(e) => {
                self.heap.unref(a);
                Err(self.raise(e))
            }
        }
    }

    fn exec_binary(
        &mut self,
        f: fn(&mut Heap, ObjRef, ObjRef) -> OpResult,
    ) -> Result<(), VmError> {
        let b = self.pop_must()?;
        let a = self.pop_must()?;
        match f(&mut self.heap, a, b) {
            Ok(r) => {
                self.push(r);
                self.heap.unref(a);
                self.heap.unref(b);
                Ok(())
            }
            Err(e) => {
                self.heap.unref(a);
                self.heap.unref(b);
                Err(self.raise(e))
            }
        }
    }

    /// Ordering-based comparisons: pops two operands, pushes a BOOL.
    fn exec_relation(&mut self, pred: fn(Ordering) -> bool) -> Result<(), VmError> {
        let b = self.pop_must()?;
        let a = self.pop_must()?;
        let res = object::compare(&mut self.heap, a, b);
        match res {
            Ok(c) => {
                let ord = match object::get_integer(c) {
                    v if v < 0 => Ordering::Less,
                    0 => Ordering::Equal,
                    _ => Ordering::Greater,
                };
                self.heap.discard(c);
                let r = self.heap.bool_obj(pred(ord));
                self.push(r);
                self.heap.unref(a);
                self.heap.unref(b);
                Ok(())
            }
            Err(e) => {
                self.heap.unref(a);
                self.heap.unref(b);
                Err(self.raise(e))
            }
        }
    }

    /// In-place operator against a named variable: pops the operand,
    /// applies, stores back, pushes the result.
    fn exec_var_ip(
        &mut self,
        para: Para,
        f: fn(&mut Heap, ObjRef, ObjRef) -> OpResult,
    ) -> Result<(), VmError> {
        let (name, _) = self.varname(para)?;
        let b = self.pop_must()?;
        let c = match self.lookup_var(&name) {
            Ok(c) => c,
            Err(e) => {
                self.heap.unref(b);
                return Err(self.raise(e));
            }
        };
        let r = match f(&mut self.heap, c, b) {
            Ok(r) => r,
            Err(e) => {
                self.heap.unref(b);
                return Err(self.raise(e));
            }
        };
        self.push(r);
        self.heap.unref(b);
        if let Err(e) = self.assign_var(&name, r) {
            return Err(self.raise(e));
        }
        Ok(())
    }

    /// In-place operator against a subscript: pops index, container
    /// and operand, applies to the element, stores back, pushes the
    /// result.
    fn exec_index_ip(
        &mut self,
        f: fn(&mut Heap, ObjRef, ObjRef) -> OpResult,
    ) -> Result<(), VmError> {
        let b = self.pop_must()?;
        let a = self.pop_must()?;
        let c = self.pop_must()?;
        let result = object::index(&mut self.heap, a, b)
            .and_then(|d| f(&mut self.heap, d, c))
            .and_then(|r| object::ipindex(&mut self.heap, a, b, r));
        match result {
            Ok(r) => {
                self.push(r);
                self.heap.unref(a);
                self.heap.unref(b);
                self.heap.unref(c);
                Ok(())
            }
            Err(e) => {
                self.heap.unref(a);
                self.heap.unref(b);
                self.heap.unref(c);
                Err(self.raise(e))
            }
        }
    }

    /// In-place operator against a compound member.
    fn exec_member_ip(
        &mut self,
        para: Para,
        f: fn(&mut Heap, ObjRef, ObjRef) -> OpResult,
    ) -> Result<(), VmError> {
        let (name, _) = self.varname(para)?;
        let a = self.pop_must()?;
        let c = self.pop_must()?;
        let result = check_compound(a)
            .and_then(|()| compound::get_member(&mut self.heap, a, &name))
            .and_then(|d| f(&mut self.heap, d, c))
            .and_then(|r| compound::store_member(&mut self.heap, a, &name, r));
        match result {
            Ok(r) => {
                self.push(r);
                self.heap.unref(a);
                self.heap.unref(c);
                Ok(())
            }
            Err(e) => {
                self.heap.unref(a);
                self.heap.unref(c);
                Err(self.raise(e))
            }
        }
    }

    /// Pre/post increment and decrement of a named variable. The
    /// postfix forms push the old value instead of the new.
    fn exec_var_step(&mut self, para: Para, delta: i32, postfix: bool) -> Result<(), VmError> {
        let (name, _) = self.varname(para)?;
        let b = match self.lookup_var(&name) {
            Ok(b) => b,
            Err(e) => return Err(self.raise(e)),
        };
        let one = self.heap.int_obj(delta);
        let d = match object::add(&mut self.heap, b, one) {
            Ok(d) => d,
            Err(e) => return Err(self.raise(e)),
        };
        if postfix {
            self.push(b);
        } else {
            self.push(d);
        }
        if let Err(e) = self.assign_var(&name, d) {
            return Err(self.raise(e));
        }
        self.heap.discard(d);
        Ok(())
    }

    /// Pre/post increment and decrement of a subscripted element.
    fn exec_index_step(&mut self, delta: i32, postfix: bool) -> Result<(), VmError> {
        let b = self.pop_must()?;
        let a = self.pop_must()?;
        let one = self.heap.int_obj(delta);
        let d = match object::index(&mut self.heap, a, b) {
            Ok(d) => d,
            Err(e) => {
                self.heap.unref(a);
                self.heap.unref(b);
                return Err(self.raise(e));
            }
        };
        if d.is_null() {
            self.heap.unref(a);
            self.heap.unref(b);
            let e = RuntimeError::Type("null object can not be modified.".to_string());
            return Err(self.raise(e));
        }
        if postfix {
            self.push(d);
        }
        let result = object::add(&mut self.heap, d, one)
            .and_then(|e| object::ipindex(&mut self.heap, a, b, e));
        match result {
            Ok(e) => {
                if !postfix {
                    self.push(e);
                }
                self.heap.unref(a);
                self.heap.unref(b);
                Ok(())
            }
            Err(err) => {
                self.heap.unref(a);
                self.heap.unref(b);
                Err(self.raise(err))
            }
        }
    }

    /// Pre/post increment and decrement of a compound member.
    fn exec_member_step(&mut self, para: Para, delta: i32, postfix: bool) -> Result<(), VmError> {
        let (name, _) = self.varname(para)?;
        let a = self.pop_must()?;
        let one = self.heap.int_obj(delta);
        let result = check_compound(a).and_then(|()| compound::get_member(&mut self.heap, a, &name));
        let d = match result {
            Ok(d) => d,
            Err(e) => {
                self.heap.unref(a);
                return Err(self.raise(e));
            }
        };
        if d.is_null() {
            self.heap.unref(a);
            let e = RuntimeError::Type("null object can not be modified.".to_string());
            return Err(self.raise(e));
        }
        if postfix {
            self.push(d);
        }
        let result = object::add(&mut self.heap, d, one)
            .and_then(|e| compound::store_member(&mut self.heap, a, &name, e));
        match result {
            Ok(e) => {
                if !postfix {
                    self.push(e);
                }
                self.heap.unref(a);
                Ok(())
            }
            Err(err) => {
                self.heap.unref(a);
                Err(self.raise(err))
            }
        }
    }

    // ----- the dispatch ---------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, op: Op, para: Para) -> Result<Flow, VmError> {
        match op {
            Op::LoadConst => {
                let r = self
                    .frames
                    .last()
                    .and_then(|f| f.code.get_const(para));
                let Some(mut r) = r else {
                    return Err(
                        self.raise(RuntimeError::Type("constant slot out of range.".to_string()))
                    );
                };
                if self.is_worker && !r.is_void() {
                    let copied = copy::deep_copy(&mut self.heap, r);
                    r = self.rt(copied)?;
                }
                self.push(r);
                Ok(Flow::Continue)
            }

            Op::StoreLocal => {
                let (name, declared) = self.varname(para)?;
                let b = self.pop_must()?;
                let stored = if declared != TypeTag::ALL && b.tag() != declared {
                    match object::cast(&mut self.heap, b, declared) {
                        Ok(c) => c,
                        Err(e) => {
                            self.heap.unref(b);
                            return Err(self.raise(e));
                        }
                    }
                } else {
                    b
                };
                let res = self.current().store_local(&name, stored);
                if let Err(e) = res {
                    self.heap.unref(b);
                    if stored != b {
                        self.heap.discard(stored);
                    }
                    return Err(self.raise(e));
                }
                self.heap.unref(b);
                if stored != b {
                    self.heap.discard(stored);
                }
                Ok(Flow::Continue)
            }

            Op::StoreDef => {
                let (name, declared) = self.varname(para)?;
                let meta = self.resolve_meta(declared);
                let b = match self.heap.default_obj(declared, meta) {
                    Ok(b) => b,
                    Err(e) => return Err(self.raise(e)),
                };
                let res = self.current().store_local(&name, b);
                if let Err(e) = res {
                    self.heap.discard(b);
                    return Err(self.raise(e));
                }
                Ok(Flow::Continue)
            }

            Op::StoreVar => {
                let (name, _) = self.varname(para)?;
                let Some(&b) = self.stack.last() else {
                    return Err(
                        self.raise(RuntimeError::Type("value stack underflow.".to_string()))
                    );
                };
                if let Err(e) = self.assign_var(&name, b) {
                    return Err(self.raise(e));
                }
                Ok(Flow::Continue)
            }

            Op::StoreException => {
                let (name, _) = self.varname(para)?;
                let b = self.pop_must()?;
                let res = self.current().store_local(&name, b);
                self.heap.unref(b);
                if let Err(e) = res {
                    return Err(self.raise(e));
                }
                Ok(Flow::Continue)
            }

            Op::StoreMember => {
                let (name, _) = self.varname(para)?;
                let a = self.pop_must()?;
                let c = self.pop_must()?;
                let result =
                    check_compound(a).and_then(|()| {
                        compound::store_member(&mut self.heap, a, &name, c)
                    });
                match result {
                    Ok(r) => {
                        self.push(r);
                        self.heap.unref(a);
                        self.heap.unref(c);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        self.heap.unref(c);
                        Err(self.raise(e))
                    }
                }
            }

            Op::LoadVar => {
                let (name, _) = self.varname(para)?;
                let r = match self.lookup_var(&name) {
                    Ok(r) => r,
                    Err(e) => return Err(self.raise(e)),
                };
                if r.is_null() {
                    let e = RuntimeError::Name(format!("variable undefined: {name}."));
                    return Err(self.raise(e));
                }
                self.push(r);
                Ok(Flow::Continue)
            }

            Op::LoadMember => {
                let (name, _) = self.varname(para)?;
                let b = self.pop_must()?;
                let result =
                    check_compound(b).and_then(|()| compound::get_member(&mut self.heap, b, &name));
                match result {
                    Ok(r) => {
                        self.push(r);
                        self.heap.unref(b);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(b);
                        Err(self.raise(e))
                    }
                }
            }

            Op::TypeCast => {
                let a = self.pop_must()?;
                match object::cast(&mut self.heap, a, TypeTag(para as i32)) {
                    Ok(r) => {
                        self.push(r);
                        self.heap.unref(a);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        Err(self.raise(e))
                    }
                }
            }

            Op::VarInc => self.exec_var_step(para, 1, false).map(|()| Flow::Continue),
            Op::VarDec => self.exec_var_step(para, -1, false).map(|()| Flow::Continue),
            Op::VarPoinc => self.exec_var_step(para, 1, true).map(|()| Flow::Continue),
            Op::VarPodec => self.exec_var_step(para, -1, true).map(|()| Flow::Continue),

            Op::MemberInc => self.exec_member_step(para, 1, false).map(|()| Flow::Continue),
            Op::MemberDec => self.exec_member_step(para, -1, false).map(|()| Flow::Continue),
            Op::MemberPoinc => self.exec_member_step(para, 1, true).map(|()| Flow::Continue),
            Op::MemberPodec => self.exec_member_step(para, -1, true).map(|()| Flow::Continue),

            Op::IndexInc => self.exec_index_step(1, false).map(|()| Flow::Continue),
            Op::IndexDec => self.exec_index_step(-1, false).map(|()| Flow::Continue),
            Op::IndexPoinc => self.exec_index_step(1, true).map(|()| Flow::Continue),
            Op::IndexPodec => self.exec_index_step(-1, true).map(|()| Flow::Continue),

            Op::Negative => self.exec_unary(object::neg).map(|()| Flow::Continue),
            Op::BitNot => self.exec_unary(object::bit_not).map(|()| Flow::Continue),
            Op::LogicNot => self.exec_unary(object::logic_not).map(|()| Flow::Continue),

            Op::PopStack => {
                let a = self.pop_must()?;
                self.heap.unref(a);
                Ok(Flow::Continue)
            }

            Op::LoadIndex => {
                let b = self.pop_must()?;
                let a = self.pop_must()?;
                match object::index(&mut self.heap, a, b) {
                    Ok(r) => {
                        self.push(r);
                        self.heap.unref(a);
                        self.heap.unref(b);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        self.heap.unref(b);
                        Err(self.raise(e))
                    }
                }
            }

            Op::StoreIndex => {
                let b = self.pop_must()?;
                let a = self.pop_must()?;
                let c = self.pop_must()?;
                match object::ipindex(&mut self.heap, a, b, c) {
                    Ok(r) => {
                        self.push(r);
                        self.heap.unref(a);
                        self.heap.unref(b);
                        self.heap.unref(c);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        self.heap.unref(b);
                        self.heap.unref(c);
                        Err(self.raise(e))
                    }
                }
            }

            Op::MakeVec => {
                let n = para as usize;
                let mut elems = Vec::with_capacity(n);
                for _ in 0..n {
                    elems.push(self.pop_must()?);
                }
                elems.reverse();
                let r = self.heap.vec_obj(elems);
                self.push(r);
                Ok(Flow::Continue)
            }

            Op::CallFunc => self.exec_call(),

            Op::BindArgs => {
                let a = self.pop_must()?;
                if a.tag() != TypeTag::VEC {
                    self.heap.unref(a);
                    return Err(
                        self.raise(RuntimeError::Argument("no argument passed.".to_string()))
                    );
                }
                let res = {
                    let heap = &mut self.heap;
                    match self.frames.last_mut() {
                        Some(frame) => frame.bind_args(heap, a),
                        None => Err(RuntimeError::Argument("no active frame.".to_string())),
                    }
                };
                self.heap.unref(a);
                if let Err(e) = res {
                    return Err(self.raise(e));
                }
                Ok(Flow::Continue)
            }

            Op::ConSel => {
                let c = self.pop_must()?;
                let b = self.pop_must()?;
                let a = self.pop_must()?;
                match object::is_zero(a) {
                    Ok(zero) => {
                        let keep = if zero { c } else { b };
                        let drop = if zero { b } else { c };
                        self.push_owned(keep);
                        self.heap.unref(a);
                        self.heap.unref(drop);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        self.heap.unref(b);
                        self.heap.unref(c);
                        Err(self.raise(e))
                    }
                }
            }

            Op::LogicOr => self.exec_binary(object::logic_or).map(|()| Flow::Continue),
            Op::LogicAnd => self.exec_binary(object::logic_and).map(|()| Flow::Continue),
            Op::BitOr => self.exec_binary(object::bit_or).map(|()| Flow::Continue),
            Op::BitXor => self.exec_binary(object::bit_xor).map(|()| Flow::Continue),
            Op::BitAnd => self.exec_binary(object::bit_and).map(|()| Flow::Continue),
            Op::Equal => self.exec_binary(object::eq).map(|()| Flow::Continue),

            Op::NotEqual => {
                let b = self.pop_must()?;
                let a = self.pop_must()?;
                match object::value_eq(a, b) {
                    Ok(eq) => {
                        let r = self.heap.bool_obj(!eq);
                        self.push(r);
                        self.heap.unref(a);
                        self.heap.unref(b);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        self.heap.unref(b);
                        Err(self.raise(e))
                    }
                }
            }

            Op::LessThan => self.exec_relation(Ordering::is_lt).map(|()| Flow::Continue),
            Op::LargerThan => self.exec_relation(Ordering::is_gt).map(|()| Flow::Continue),
            Op::LessEqual => self.exec_relation(Ordering::is_le).map(|()| Flow::Continue),
            Op::LargerEqual => self.exec_relation(Ordering::is_ge).map(|()| Flow::Continue),

            Op::LeftShift => self.exec_binary(object::left_shift).map(|()| Flow::Continue),
            Op::RightShift => self.exec_binary(object::right_shift).map(|()| Flow::Continue),
            Op::Add => self.exec_binary(object::add).map(|()| Flow::Continue),
            Op::Sub => self.exec_binary(object::sub).map(|()| Flow::Continue),
            Op::Mul => self.exec_binary(object::mul).map(|()| Flow::Continue),
            Op::Div => self.exec_binary(object::div).map(|()| Flow::Continue),
            Op::Mod => self.exec_binary(object::rem).map(|()| Flow::Continue),

            Op::VarIpMul => self.exec_var_ip(para, object::mul).map(|()| Flow::Continue),
            Op::VarIpDiv => self.exec_var_ip(para, object::div).map(|()| Flow::Continue),
            Op::VarIpMod => self.exec_var_ip(para, object::rem).map(|()| Flow::Continue),
            Op::VarIpAdd => self.exec_var_ip(para, object::add).map(|()| Flow::Continue),
            Op::VarIpSub => self.exec_var_ip(para, object::sub).map(|()| Flow::Continue),
            Op::VarIpLs => self.exec_var_ip(para, object::left_shift).map(|()| Flow::Continue),
            Op::VarIpRs => self.exec_var_ip(para, object::right_shift).map(|()| Flow::Continue),
            Op::VarIpAnd => self.exec_var_ip(para, object::bit_and).map(|()| Flow::Continue),
            Op::VarIpXor => self.exec_var_ip(para, object::bit_xor).map(|()| Flow::Continue),
            Op::VarIpOr => self.exec_var_ip(para, object::bit_or).map(|()| Flow::Continue),

            Op::IndexIpMul => self.exec_index_ip(object::mul).map(|()| Flow::Continue),
            Op::IndexIpDiv => self.exec_index_ip(object::div).map(|()| Flow::Continue),
            Op::IndexIpMod => self.exec_index_ip(object::rem).map(|()| Flow::Continue),
            Op::IndexIpAdd => self.exec_index_ip(object::add).map(|()| Flow::Continue),
            Op::IndexIpSub => self.exec_index_ip(object::sub).map(|()| Flow::Continue),
            Op::IndexIpLs => self.exec_index_ip(object::left_shift).map(|()| Flow::Continue),
            Op::IndexIpRs => self.exec_index_ip(object::right_shift).map(|()| Flow::Continue),
            Op::IndexIpAnd => self.exec_index_ip(object::bit_and).map(|()| Flow::Continue),
            Op::IndexIpXor => self.exec_index_ip(object::bit_xor).map(|()| Flow::Continue),
            Op::IndexIpOr => self.exec_index_ip(object::bit_or).map(|()| Flow::Continue),

            Op::MemberIpMul => self.exec_member_ip(para, object::mul).map(|()| Flow::Continue),
            Op::MemberIpDiv => self.exec_member_ip(para, object::div).map(|()| Flow::Continue),
            Op::MemberIpMod => self.exec_member_ip(para, object::rem).map(|()| Flow::Continue),
            Op::MemberIpAdd => self.exec_member_ip(para, object::add).map(|()| Flow::Continue),
            Op::MemberIpSub => self.exec_member_ip(para, object::sub).map(|()| Flow::Continue),
            Op::MemberIpLs => self.exec_member_ip(para, object::left_shift).map(|()| Flow::Continue),
            Op::MemberIpRs => self.exec_member_ip(para, object::right_shift).map(|()| Flow::Continue),
            Op::MemberIpAnd => self.exec_member_ip(para, object::bit_and).map(|()| Flow::Continue),
            Op::MemberIpXor => self.exec_member_ip(para, object::bit_xor).map(|()| Flow::Continue),
            Op::MemberIpOr => self.exec_member_ip(para, object::bit_or).map(|()| Flow::Continue),

            Op::JumpFalse | Op::JumpTrue => {
                let a = self.pop_must()?;
                match object::is_zero(a) {
                    Ok(zero) => {
                        let take = if op == Op::JumpFalse { zero } else { !zero };
                        if take {
                            self.current().jump(para);
                        }
                        self.heap.unref(a);
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        Err(self.raise(e))
                    }
                }
            }

            Op::JumpForce | Op::JumpContinue | Op::JumpBreak => {
                self.current().jump(para);
                Ok(Flow::Continue)
            }

            Op::EnterBlock => {
                let depth = self.stack.len();
                self.current().enter_block(para, depth, para != 0);
                Ok(Flow::Continue)
            }

            Op::LeaveBlock => {
                let left = {
                    let heap = &mut self.heap;
                    match self.frames.last_mut() {
                        Some(frame) => frame.leave_block(heap),
                        None => Err(RuntimeError::Name("no active frame.".to_string())),
                    }
                };
                let bottom = self.rt(left)?;
                self.stack_discard_to(bottom);
                // Block exit is the collector's tick point.
                gc::collect(&mut self.heap);
                Ok(Flow::Continue)
            }

            Op::PushBlocks => {
                for _ in 0..para {
                    let depth = self.stack.len();
                    self.current().enter_block(0, depth, false);
                }
                Ok(Flow::Continue)
            }

            Op::PopBlocks => {
                for _ in 0..para {
                    let left = {
                        let heap = &mut self.heap;
                        match self.frames.last_mut() {
                            Some(frame) => frame.leave_block(heap),
                            None => Err(RuntimeError::Name("no active frame.".to_string())),
                        }
                    };
                    let bottom = self.rt(left)?;
                    self.stack_discard_to(bottom);
                }
                Ok(Flow::Continue)
            }

            Op::JumpCase => {
                let b = self.pop_must()?;
                let a = self.pop_must()?;
                match object::value_eq(a, b) {
                    Ok(eq) => {
                        self.heap.unref(b);
                        if eq {
                            self.heap.unref(a);
                        } else {
                            self.push_owned(a);
                            self.current().jump(para);
                        }
                        Ok(Flow::Continue)
                    }
                    Err(e) => {
                        self.heap.unref(a);
                        self.heap.unref(b);
                        Err(self.raise(e))
                    }
                }
            }

            Op::JumpDefault => {
                let a = self.pop_must()?;
                self.heap.unref(a);
                self.current().jump(para);
                Ok(Flow::Continue)
            }

            Op::Return => {
                if !self.current().code.is_func() {
                    let msg = if self.cmdline {
                        "do not return from cmdline."
                    } else {
                        "return outside function."
                    };
                    return Err(self.raise(RuntimeError::ReturnType(msg.to_string())));
                }
                let a = self.pop_must()?;
                let ret_type = self
                    .frames
                    .last()
                    .map_or(TypeTag::VOID, |f| f.code.ret_type());
                let r = if a.tag() == ret_type {
                    a
                } else {
                    match object::cast(&mut self.heap, a, ret_type) {
                        Ok(r) => r,
                        Err(_) => {
                            self.heap.unref(a);
                            let e = RuntimeError::ReturnType(format!(
                                "return value can not be cast to {ret_type}."
                            ));
                            return Err(self.raise(e));
                        }
                    }
                };
                let bottom = self.current().bottom;
                self.stack_discard_to(bottom);
                if let Some(mut frame) = self.frames.pop() {
                    frame.release(&mut self.heap);
                }
                self.push(r);
                self.heap.unref(a);
                Ok(Flow::Return)
            }

            Op::EndProgram => {
                let bottom = self.current().bottom;
                self.stack_discard_to(bottom);
                if let Some(mut frame) = self.frames.pop() {
                    frame.release(&mut self.heap);
                }
                Ok(Flow::Return)
            }
        }
    }

    /// CALL_FUNC: dispatch a builtin or recurse into a user function.
    fn exec_call(&mut self) -> Result<Flow, VmError> {
        let mut a = self.pop_must()?;
        let mut has_args = false;

        if a.tag() != TypeTag::FUNC {
            // The argument vector may sit on top of the callee.
            if a.tag() != TypeTag::VEC {
                self.heap.unref(a);
                return Err(
                    self.raise(RuntimeError::Type("only func object is callable.".to_string()))
                );
            }
            let b = a;
            a = self.pop_must()?;
            if a.tag() != TypeTag::FUNC {
                self.heap.unref(a);
                self.heap.unref(b);
                return Err(
                    self.raise(RuntimeError::Type("only func object is callable.".to_string()))
                );
            }
            self.push_owned(b);
            has_args = true;
        } else {
            has_args = self
                .current()
                .prev_opcode()
                .is_some_and(|(op, _)| op == Op::MakeVec);
        }

        if let Some(slot) = object::func_builtin(a) {
            let args = if has_args {
                match self.pop() {
                    Some(v) => v,
                    None => {
                        self.heap.unref(a);
                        return Err(self.raise(RuntimeError::Argument(
                            "no argument passed.".to_string(),
                        )));
                    }
                }
            } else {
                let v = self.heap.vec_obj(Vec::new());
                v.inc_ref();
                v
            };
            let result = builtins::execute(self, slot, args);
            self.heap.unref(args);
            self.heap.unref(a);
            match result {
                Ok(r) => {
                    self.push(r);
                    Ok(Flow::Continue)
                }
                Err(e) => Err(self.raise(e)),
            }
        } else if let Some(code) = object::func_code(a) {
            if has_args && code.arg_count() == 0 {
                self.heap.unref(a);
                let e = RuntimeError::Argument(format!(
                    "func {} requires no argument.",
                    code.name()
                ));
                return Err(self.raise(e));
            }
            if !has_args && code.arg_count() > 0 {
                self.heap.unref(a);
                return Err(self.raise(RuntimeError::Argument("no argument passed.".to_string())));
            }
            debug!(func = code.name(), "calling user function");
            let frame = Frame::new(code, self.stack.len(), false, false);
            self.frames.push(frame);
            let res = self.play();
            self.heap.unref(a);
            match res {
                Ok(()) => Ok(Flow::Continue),
                Err(ve) => Err(ve),
            }
        } else {
            self.heap.unref(a);
            Err(self.raise(RuntimeError::Type("null func is not callable.".to_string())))
        }
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on a captured output buffer, for tests and tooling.
#[derive(Clone, Default)]
pub struct CapturedOutput(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

impl CapturedOutput {
    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Interp {
    /// Interpreter whose program output lands in a shared buffer.
    #[must_use]
    pub fn with_captured_output() -> (Self, CapturedOutput) {
        let capture = CapturedOutput::default();
        let interp = Self::with_output(Box::new(capture.clone()));
        (interp, capture)
    }
}

/// STRUCT/UNION operand guard shared by the member opcodes.
fn check_compound(r: ObjRef) -> Result<(), RuntimeError> {
    if r.tag().is_compound() {
        Ok(())
    } else {
        Err(RuntimeError::Type("not a compound.".to_string()))
    }
}
