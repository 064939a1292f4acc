// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Compiled code units.
//!
//! A [`Code`] represents one compiled unit: a top-level module or a
//! function body. It owns the 32-bit opcode stream (top 8 bits opcode,
//! bottom 24 bits parameter), parallel source line info, the constant
//! pool, the local-variable table, nested sub-codes and the metadata of
//! struct/union declarations introduced by the unit.

#[cfg(test)]
mod code_test;

pub mod binary;

use std::rc::Rc;

use crate::heap::Heap;
use crate::object::{self, ObjRef};
use crate::types::TypeTag;

/// Opcode parameter, 24-bit unsigned.
pub type Para = u32;

/// Largest encodable parameter.
pub const MAX_PARA: u32 = 0x00ff_ffff;

/// Bits reserved for the parameter.
pub const PARA_BITS: u32 = 24;

/// Pack an opcode and parameter into an instruction word.
#[inline]
#[must_use]
pub const fn pack(op: Op, para: Para) -> u32 {
    ((op as u32) << PARA_BITS) | (para & MAX_PARA)
}

/// Opcode of an instruction word.
#[inline]
#[must_use]
pub const fn unpack_op(word: u32) -> Option<Op> {
    Op::from_u8((word >> PARA_BITS) as u8)
}

/// Parameter of an instruction word.
#[inline]
#[must_use]
pub const fn unpack_para(word: u32) -> Para {
    word & MAX_PARA
}

macro_rules! ops {
    ($($name:ident = $val:literal => $mn:literal),+ $(,)?) => {
        /// Instruction opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum Op {
            $($name = $val),+
        }

        impl Op {
            /// Decode an opcode byte.
            #[must_use]
            pub const fn from_u8(v: u8) -> Option<Self> {
                match v {
                    $($val => Some(Self::$name),)+
                    _ => None,
                }
            }

            /// Mnemonic for disassembly.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mn),+
                }
            }
        }
    };
}

ops! {
    LoadConst = 1 => "LOAD_CONST",
    StoreLocal = 2 => "STORE_LOCAL",
    StoreVar = 3 => "STORE_VAR",
    StoreDef = 4 => "STORE_DEF",
    StoreException = 5 => "STORE_EXCEPTION",
    StoreMember = 6 => "STORE_MEMBER",
    LoadVar = 7 => "LOAD_VAR",
    LoadMember = 8 => "LOAD_MEMBER",
    TypeCast = 9 => "TYPE_CAST",
    VarInc = 10 => "VAR_INC",
    VarDec = 11 => "VAR_DEC",
    VarPoinc = 12 => "VAR_POINC",
    VarPodec = 13 => "VAR_PODEC",
    MemberInc = 14 => "MEMBER_INC",
    MemberDec = 15 => "MEMBER_DEC",
    MemberPoinc = 16 => "MEMBER_POINC",
    MemberPodec = 17 => "MEMBER_PODEC",
    Negative = 18 => "NEGATIVE",
    BitNot = 19 => "BIT_NOT",
    LogicNot = 20 => "LOGIC_NOT",
    PopStack = 21 => "POP_STACK",
    LoadIndex = 22 => "LOAD_INDEX",
    StoreIndex = 23 => "STORE_INDEX",
    IndexInc = 24 => "INDEX_INC",
    IndexDec = 25 => "INDEX_DEC",
    IndexPoinc = 26 => "INDEX_POINC",
    IndexPodec = 27 => "INDEX_PODEC",
    MakeVec = 28 => "MAKE_VEC",
    CallFunc = 29 => "CALL_FUNC",
    BindArgs = 30 => "BIND_ARGS",
    ConSel = 31 => "CON_SEL",
    LogicOr = 32 => "LOGIC_OR",
    LogicAnd = 33 => "LOGIC_AND",
    BitOr = 34 => "BIT_OR",
    BitXor = 35 => "BIT_XOR",
    BitAnd = 36 => "BIT_AND",
    Equal = 37 => "EQUAL",
    NotEqual = 38 => "NOT_EQUAL",
    LessThan = 39 => "LESS_THAN",
    LargerThan = 40 => "LARGER_THAN",
    LessEqual = 41 => "LESS_EQUAL",
    LargerEqual = 42 => "LARGER_EQUAL",
    LeftShift = 43 => "LEFT_SHIFT",
    RightShift = 44 => "RIGHT_SHIFT",
    Add = 45 => "ADD",
    Sub = 46 => "SUB",
    Mul = 47 => "MUL",
    Div = 48 => "DIV",
    Mod = 49 => "MOD",
    VarIpMul = 50 => "VAR_IPMUL",
    VarIpDiv = 51 => "VAR_IPDIV",
    VarIpMod = 52 => "VAR_IPMOD",
    VarIpAdd = 53 => "VAR_IPADD",
    VarIpSub = 54 => "VAR_IPSUB",
    VarIpLs = 55 => "VAR_IPLS",
    VarIpRs = 56 => "VAR_IPRS",
    VarIpAnd = 57 => "VAR_IPAND",
    VarIpXor = 58 => "VAR_IPXOR",
    VarIpOr = 59 => "VAR_IPOR",
    IndexIpMul = 60 => "INDEX_IPMUL",
    IndexIpDiv = 61 => "INDEX_IPDIV",
    IndexIpMod = 62 => "INDEX_IPMOD",
    IndexIpAdd = 63 => "INDEX_IPADD",
    IndexIpSub = 64 => "INDEX_IPSUB",
    IndexIpLs = 65 => "INDEX_IPLS",
    IndexIpRs = 66 => "INDEX_IPRS",
    IndexIpAnd = 67 => "INDEX_IPAND",
    IndexIpXor = 68 => "INDEX_IPXOR",
    IndexIpOr = 69 => "INDEX_IPOR",
    MemberIpMul = 70 => "MEMBER_IPMUL",
    MemberIpDiv = 71 => "MEMBER_IPDIV",
    MemberIpMod = 72 => "MEMBER_IPMOD",
    MemberIpAdd = 73 => "MEMBER_IPADD",
    MemberIpSub = 74 => "MEMBER_IPSUB",
    MemberIpLs = 75 => "MEMBER_IPLS",
    MemberIpRs = 76 => "MEMBER_IPRS",
    MemberIpAnd = 77 => "MEMBER_IPAND",
    MemberIpXor = 78 => "MEMBER_IPXOR",
    MemberIpOr = 79 => "MEMBER_IPOR",
    JumpFalse = 80 => "JUMP_FALSE",
    JumpTrue = 81 => "JUMP_TRUE",
    JumpForce = 82 => "JUMP_FORCE",
    EnterBlock = 83 => "ENTER_BLOCK",
    LeaveBlock = 84 => "LEAVE_BLOCK",
    JumpContinue = 85 => "JUMP_CONTINUE",
    JumpBreak = 86 => "JUMP_BREAK",
    Return = 87 => "RETURN",
    PushBlocks = 88 => "PUSH_BLOCKS",
    PopBlocks = 89 => "POP_BLOCKS",
    JumpCase = 90 => "JUMP_CASE",
    JumpDefault = 91 => "JUMP_DEFAULT",
    EndProgram = 92 => "END_PROGRAM",
}

impl Op {
    /// Whether the parameter is an instruction address. These are the
    /// opcodes the switch-reordering pass has to remap.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Self::JumpFalse
                | Self::JumpTrue
                | Self::JumpForce
                | Self::JumpContinue
                | Self::JumpBreak
                | Self::JumpCase
                | Self::JumpDefault
                | Self::EnterBlock
        )
    }
}

/// One entry of the local-variable table.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: TypeTag,
    pub is_param: bool,
}

/// Field metadata of one struct or union declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundMeta {
    pub tag: TypeTag,
    pub name: String,
    /// Declared fields in order: (name, declared type).
    pub fields: Vec<(String, TypeTag)>,
}

impl CompoundMeta {
    /// Index of a declared field.
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }
}

/// A compiled unit: a module or a function body.
#[derive(Clone, Debug)]
pub struct Code {
    name: String,
    filename: String,
    opcodes: Vec<u32>,
    lineinfo: Vec<u32>,
    consts: Vec<ObjRef>,
    varnames: Vec<VarInfo>,
    subs: Vec<Rc<Code>>,
    struct_metas: Vec<Rc<CompoundMeta>>,
    union_metas: Vec<Rc<CompoundMeta>>,
    fun: bool,
    /// Source line of the opening `{` for functions, first line for
    /// modules.
    lineno: u32,
    ret_type: TypeTag,
    arg_count: u32,
}

impl Code {
    #[must_use]
    pub fn new(filename: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            filename: filename.to_string(),
            opcodes: Vec::new(),
            lineinfo: Vec::new(),
            consts: Vec::new(),
            varnames: Vec::new(),
            subs: Vec::new(),
            struct_metas: Vec::new(),
            union_metas: Vec::new(),
            fun: false,
            lineno: 0,
            ret_type: TypeTag::VOID,
            arg_count: 0,
        }
    }

    /// Mark this code as a function body. The parameter count is
    /// accumulated by [`Code::declare_var`].
    pub fn set_func(&mut self, line: u32, ret_type: TypeTag) {
        self.fun = true;
        self.lineno = line;
        self.ret_type = ret_type;
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub const fn is_func(&self) -> bool {
        self.fun
    }

    #[must_use]
    pub const fn ret_type(&self) -> TypeTag {
        self.ret_type
    }

    #[must_use]
    pub const fn arg_count(&self) -> u32 {
        self.arg_count
    }

    #[must_use]
    pub const fn first_line(&self) -> u32 {
        self.lineno
    }

    /// Append an instruction; returns its position.
    pub fn push_opcode(&mut self, op: Op, para: Para, line: u32) -> Para {
        let pos = self.opcodes.len() as Para;
        self.opcodes.push(pack(op, para));
        self.lineinfo.push(line);
        pos
    }

    /// Rewrite the instruction at `pos` (jump fixups).
    pub fn modify_opcode(&mut self, pos: Para, op: Op, para: Para) {
        self.opcodes[pos as usize] = pack(op, para);
    }

    /// Number of instructions emitted so far.
    #[must_use]
    pub fn current_pos(&self) -> Para {
        self.opcodes.len() as Para
    }

    /// Raw instruction word at `pos`.
    #[must_use]
    pub fn raw(&self, pos: Para) -> u32 {
        self.opcodes[pos as usize]
    }

    /// Decoded instruction at `pos`.
    #[must_use]
    pub fn get(&self, pos: Para) -> Option<(Op, Para)> {
        let word = *self.opcodes.get(pos as usize)?;
        Some((unpack_op(word)?, unpack_para(word)))
    }

    /// Last emitted instruction, if any.
    #[must_use]
    pub fn last_opcode(&self) -> Option<(Op, Para)> {
        if self.opcodes.is_empty() {
            None
        } else {
            self.get(self.opcodes.len() as Para - 1)
        }
    }

    #[must_use]
    pub fn get_line(&self, pos: Para) -> u32 {
        self.lineinfo.get(pos as usize).copied().unwrap_or(0)
    }

    /// Drop every instruction from `pos` on (REPL error recovery).
    pub fn truncate_to(&mut self, pos: Para) {
        self.opcodes.truncate(pos as usize);
        self.lineinfo.truncate(pos as usize);
    }

    /// Remove and return the last instruction.
    pub fn pop_opcode(&mut self) -> Option<(Op, Para)> {
        let word = self.opcodes.pop()?;
        self.lineinfo.pop();
        Some((unpack_op(word)?, unpack_para(word)))
    }

    /// Rotate the tail so `[mid, end)` comes before `[start, mid)`.
    /// Used to move an assignment's value expression in front of its
    /// target expression; neither span contains jumps.
    pub fn rotate_tail(&mut self, start: Para, mid: Para) {
        let (s, m) = (start as usize, mid as usize);
        self.opcodes[s..].rotate_left(m - s);
        self.lineinfo[s..].rotate_left(m - s);
    }

    /// Replace the instruction span `[start, end)` with `replacement`
    /// (instruction, line) pairs. Used by the switch-reordering pass.
    pub fn splice_span(&mut self, start: Para, end: Para, replacement: &[(u32, u32)]) {
        let (s, e) = (start as usize, end as usize);
        let words: Vec<u32> = replacement.iter().map(|&(w, _)| w).collect();
        let lines: Vec<u32> = replacement.iter().map(|&(_, l)| l).collect();
        self.opcodes.splice(s..e, words);
        self.lineinfo.splice(s..e, lines);
    }

    /// Intern a constant, deduplicating strings by bytes and scalars
    /// by tag and value. Returns the pool index and whether the
    /// constant already existed.
    pub fn push_const(&mut self, heap: &mut Heap, obj: ObjRef) -> (Para, bool) {
        let dedup = matches!(
            obj.tag(),
            TypeTag::STR | TypeTag::NULL | TypeTag::BOOL
        ) || obj.tag().is_numeric();
        if dedup {
            for (i, &existing) in self.consts.iter().enumerate() {
                if existing.tag() == obj.tag()
                    && object::value_eq(existing, obj).unwrap_or(false)
                {
                    return (i as Para, true);
                }
            }
        }
        heap.pin_const(obj);
        self.consts.push(obj);
        (self.consts.len() as Para - 1, false)
    }

    #[must_use]
    pub fn get_const(&self, i: Para) -> Option<ObjRef> {
        self.consts.get(i as usize).copied()
    }

    #[must_use]
    pub fn const_count(&self) -> usize {
        self.consts.len()
    }

    /// Find-or-add a variable-name entry for a use site; returns the
    /// most recently declared entry of that name.
    pub fn var_index(&mut self, name: &str) -> Para {
        if let Some(i) = self.varnames.iter().rposition(|v| v.name == name) {
            return i as Para;
        }
        self.varnames.push(VarInfo {
            name: name.to_string(),
            ty: TypeTag::ALL,
            is_param: false,
        });
        self.varnames.len() as Para - 1
    }

    /// Add a declaration entry. Duplicate declarations inside one
    /// runtime block are caught by the frame at store time.
    pub fn declare_var(&mut self, name: &str, ty: TypeTag, is_param: bool) -> Para {
        self.varnames.push(VarInfo {
            name: name.to_string(),
            ty,
            is_param,
        });
        if is_param {
            self.arg_count += 1;
        }
        self.varnames.len() as Para - 1
    }

    #[must_use]
    pub fn varname(&self, i: Para) -> Option<&VarInfo> {
        self.varnames.get(i as usize)
    }

    #[must_use]
    pub fn varname_count(&self) -> usize {
        self.varnames.len()
    }

    /// Attach a nested function code.
    pub fn push_sub(&mut self, sub: Rc<Code>) {
        self.subs.push(sub);
    }

    #[must_use]
    pub fn subs(&self) -> &[Rc<Code>] {
        &self.subs
    }

    /// Record a struct or union declaration's metadata.
    pub fn push_meta(&mut self, meta: Rc<CompoundMeta>) {
        if meta.tag.is_struct() {
            self.struct_metas.push(meta);
        } else {
            self.union_metas.push(meta);
        }
    }

    /// Metadata for a compound tag declared by this unit.
    #[must_use]
    pub fn find_compound(&self, tag: TypeTag) -> Option<Rc<CompoundMeta>> {
        self.struct_metas
            .iter()
            .chain(self.union_metas.iter())
            .find(|m| m.tag == tag)
            .cloned()
    }

    /// Metadata by declared name.
    #[must_use]
    pub fn find_compound_by_name(&self, name: &str) -> Option<Rc<CompoundMeta>> {
        self.struct_metas
            .iter()
            .chain(self.union_metas.iter())
            .find(|m| m.name == name)
            .cloned()
    }

    #[must_use]
    pub fn struct_metas(&self) -> &[Rc<CompoundMeta>] {
        &self.struct_metas
    }

    #[must_use]
    pub fn union_metas(&self) -> &[Rc<CompoundMeta>] {
        &self.union_metas
    }

    /// Human-readable listing of the unit and its nested codes.
    #[must_use]
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let kind = if self.fun { "func" } else { "module" };
        let _ = writeln!(out, "{kind} {} ({}):", self.name, self.filename);
        for (i, &word) in self.opcodes.iter().enumerate() {
            let line = self.lineinfo.get(i).copied().unwrap_or(0);
            match unpack_op(word) {
                Some(op) => {
                    let _ = writeln!(
                        out,
                        "{i:5}  [line {line:4}]  {:<14} {}",
                        op.mnemonic(),
                        unpack_para(word)
                    );
                }
                None => {
                    let _ = writeln!(out, "{i:5}  [line {line:4}]  ??? {word:#010x}");
                }
            }
        }
        if !self.consts.is_empty() {
            let _ = writeln!(out, "consts:");
            for (i, &c) in self.consts.iter().enumerate() {
                let _ = writeln!(out, "{i:5}  {}", object::dump_str(c));
            }
        }
        if !self.varnames.is_empty() {
            let _ = writeln!(out, "varnames:");
            for (i, v) in self.varnames.iter().enumerate() {
                let p = if v.is_param { " (param)" } else { "" };
                let _ = writeln!(out, "{i:5}  {} {}{p}", v.ty, v.name);
            }
        }
        for meta in self.struct_metas.iter().chain(self.union_metas.iter()) {
            let kind = if meta.tag.is_struct() { "struct" } else { "union" };
            let _ = writeln!(out, "{kind} {} (tag {}):", meta.name, meta.tag.0);
            for (name, ty) in &meta.fields {
                let _ = writeln!(out, "       {ty} {name}");
            }
        }
        for sub in &self.subs {
            let _ = write!(out, "\n{}", sub.disassemble());
        }
        out
    }
}
