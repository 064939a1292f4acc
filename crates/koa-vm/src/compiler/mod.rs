// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Recursive-descent compiler from the token stream to bytecode.
//!
//! The compiler lowers statements and expressions directly into a
//! [`Code`] unit as it parses, with one token of lookahead and no AST.
//! Forward control flow is emitted with a pending-parameter sentinel
//! and patched once the target is known; `switch` bodies are
//! physically reordered after parsing so all case comparisons sit at
//! the block entry (see the `stmt` module).

#[cfg(test)]
mod compiler_test;

mod expr;
mod stmt;

use std::path::Path;
use std::rc::Rc;

use thiserror::Error;

use crate::code::{Code, CompoundMeta, Op, Para, MAX_PARA};
use crate::heap::Heap;
use crate::lexer::{CharSource, FileSource, Lexer, StrSource, Token, TokenKind};
use crate::object::ObjRef;
use crate::types::TypeTag;

/// Sentinel parameter of a jump whose target is not yet known.
pub(crate) const PENDING: Para = MAX_PARA;

/// Code name used for modules and the REPL unit.
pub const GLOBAL_NAME: &str = "#GLOBAL";

/// Compile-time error with source location.
#[derive(Debug, Clone, Error)]
#[error("{path}:{line}: {msg}")]
pub struct SyntaxError {
    pub path: String,
    pub line: u32,
    pub msg: String,
}

/// Jump-statement context of the innermost `for`/`while`/`do`/`switch`.
pub(crate) struct Upper {
    pub kind: UpperKind,
    /// Position of the construct's ENTER_BLOCK, for block counting.
    pub enter_pos: Para,
    /// Pending JUMP_BREAK positions.
    pub breaks: Vec<Para>,
    /// Pending JUMP_CONTINUE positions.
    pub continues: Vec<Para>,
    /// Case comparison regions of a switch body: (start, end).
    pub cases: Vec<(Para, Para)>,
    /// Position of the first default-label statement.
    pub default_pos: Option<Para>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpperKind {
    Loop,
    Switch,
}

impl Upper {
    pub(crate) fn new(kind: UpperKind, enter_pos: Para) -> Self {
        Self {
            kind,
            enter_pos,
            breaks: Vec::new(),
            continues: Vec::new(),
            cases: Vec::new(),
            default_pos: None,
        }
    }
}

/// The compiler state over one token stream.
pub struct Parser<'h> {
    lexer: Lexer,
    token: Token,
    heap: &'h mut Heap,
    path: String,
    /// Compound metadata declared so far, shared with the root code.
    metas: Vec<Rc<CompoundMeta>>,
    /// Compound declarations seen, for tag allocation.
    compound_count: u32,
    /// REPL mode: one logical statement per run, laxer terminators.
    cmdline: bool,
}

impl<'h> Parser<'h> {
    /// Build a parser over a character source.
    pub fn new(
        heap: &'h mut Heap,
        source: Box<dyn CharSource>,
        path: &str,
    ) -> Result<Self, SyntaxError> {
        let mut lexer = Lexer::new(source);
        let token = match lexer.next_token() {
            Ok(t) => t,
            Err(e) => {
                return Err(SyntaxError {
                    path: path.to_string(),
                    line: e.line,
                    msg: e.msg,
                });
            }
        };
        Ok(Self {
            lexer,
            token,
            heap,
            path: path.to_string(),
            metas: Vec::new(),
            compound_count: 0,
            cmdline: false,
        })
    }

    /// Resume compound numbering from an existing code unit (REPL).
    pub fn adopt_metas(&mut self, code: &Code) {
        self.metas = code
            .struct_metas()
            .iter()
            .chain(code.union_metas().iter())
            .cloned()
            .collect();
        self.compound_count = self.metas.len() as u32;
    }

    pub(crate) fn err(&self, msg: impl Into<String>) -> SyntaxError {
        SyntaxError {
            path: self.path.clone(),
            line: self.token.line,
            msg: msg.into(),
        }
    }

    pub(crate) fn line(&self) -> u32 {
        self.token.line
    }

    /// Advance to the next token.
    pub(crate) fn next(&mut self) -> Result<(), SyntaxError> {
        match self.lexer.next_token() {
            Ok(t) => {
                self.token = t;
                Ok(())
            }
            Err(e) => Err(SyntaxError {
                path: self.path.clone(),
                line: e.line,
                msg: e.msg,
            }),
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.token.kind == kind
    }

    /// Require and consume a token.
    pub(crate) fn expect(&mut self, kind: TokenKind, msg: &str) -> Result<(), SyntaxError> {
        if !self.check(kind) {
            return Err(self.err(msg));
        }
        self.next()
    }

    /// Current token's lexeme, cloned out.
    pub(crate) fn lexeme(&self) -> String {
        self.token.lexeme.clone()
    }

    /// Intern a constant and emit LOAD_CONST for it.
    pub(crate) fn emit_const(
        &mut self,
        code: &mut Code,
        obj: ObjRef,
        line: u32,
    ) -> Result<(), SyntaxError> {
        let (pos, existed) = code.push_const(self.heap, obj);
        if existed {
            self.heap.discard(obj);
        }
        code.push_opcode(Op::LoadConst, pos, line);
        Ok(())
    }

    /// Resolve the current token as a type name. With `insert`, an
    /// unknown `struct`/`union` name declares a fresh tag. Consumes
    /// the type tokens.
    pub(crate) fn parse_type(
        &mut self,
        insert: bool,
    ) -> Result<Option<TypeTag>, SyntaxError> {
        let tag = match self.token.kind {
            TokenKind::Void => TypeTag::VOID,
            TokenKind::Bool => TypeTag::BOOL,
            TokenKind::Char => TypeTag::CHAR,
            TokenKind::Int => TypeTag::INT,
            TokenKind::Long => TypeTag::LONG,
            TokenKind::Int8 => TypeTag::INT8,
            TokenKind::Uint8 => TypeTag::UINT8,
            TokenKind::Int16 => TypeTag::INT16,
            TokenKind::Uint16 => TypeTag::UINT16,
            TokenKind::Int32 => TypeTag::INT32,
            TokenKind::Uint32 => TypeTag::UINT32,
            TokenKind::Int64 => TypeTag::INT64,
            TokenKind::Uint64 => TypeTag::UINT64,
            TokenKind::Float => TypeTag::FLOAT,
            TokenKind::Double => TypeTag::DOUBLE,
            TokenKind::Str => TypeTag::STR,
            TokenKind::Vec => TypeTag::VEC,
            TokenKind::Dict => TypeTag::DICT,
            TokenKind::Func => TypeTag::FUNC,
            TokenKind::Exception => TypeTag::EXCEPTION,
            TokenKind::Struct | TokenKind::Union => {
                let is_struct = self.check(TokenKind::Struct);
                self.next()?;
                if !self.check(TokenKind::Identifier) {
                    return Err(self.err("missing identifier after struct."));
                }
                let name = self.lexeme();
                self.next()?;
                if let Some(meta) = self.metas.iter().find(|m| m.name == name) {
                    return Ok(Some(meta.tag));
                }
                if !insert {
                    return Ok(None);
                }
                let tag = if is_struct {
                    TypeTag::struct_tag(self.compound_count)
                } else {
                    TypeTag::union_tag(self.compound_count)
                };
                self.compound_count += 1;
                let meta = Rc::new(CompoundMeta {
                    tag,
                    name,
                    fields: Vec::new(),
                });
                self.metas.push(meta);
                return Ok(Some(tag));
            }
            _ => return Ok(None),
        };
        self.next()?;
        Ok(Some(tag))
    }

    /// struct-specifier: `struct NAME { field-declarations } ;`
    /// The tag was already allocated by `parse_type`.
    fn compound_specifier(&mut self, code: &mut Code, tag: TypeTag) -> Result<(), SyntaxError> {
        self.expect(TokenKind::Sym(b'{'), "missing '{' in struct specifier.")?;

        let mut fields: Vec<(String, TypeTag)> = Vec::new();
        while !self.check(TokenKind::Sym(b'}')) {
            let Some(field_type) = self.parse_type(false)? else {
                return Err(self.err("unknown field type."));
            };
            if field_type == TypeTag::VOID {
                return Err(self.err("field can not be a void."));
            }
            if field_type == tag {
                return Err(self.err("field type is the same with struct type."));
            }
            if !self.check(TokenKind::Identifier) {
                return Err(self.err("missing identifier name."));
            }
            let fname = self.lexeme();
            if fields.iter().any(|(n, _)| *n == fname) {
                return Err(self.err("duplicated field name."));
            }
            fields.push((fname, field_type));
            self.next()?;
            self.expect(TokenKind::Sym(b';'), "missing ';' after field declaration.")?;
        }
        self.expect(TokenKind::Sym(b'}'), "missing matching '}'.")?;
        self.expect(TokenKind::Sym(b';'), "missing ';' after struct specifier.")?;

        // Replace the placeholder meta with the full field list.
        let Some(idx) = self.metas.iter().position(|m| m.tag == tag) else {
            return Err(self.err("unknown compound tag."));
        };
        let complete = Rc::new(CompoundMeta {
            tag,
            name: self.metas[idx].name.clone(),
            fields,
        });
        self.metas[idx] = Rc::clone(&complete);
        code.push_meta(complete);
        Ok(())
    }

    /// declaration: `type declarator (',' declarator)* ';'` where a
    /// declarator is `identifier ('=' assignment-expression)?`.
    pub(crate) fn declaration(
        &mut self,
        code: &mut Code,
        ty: TypeTag,
        first_name: String,
    ) -> Result<(), SyntaxError> {
        let mut name = first_name;
        loop {
            let line = self.line();
            let var = code.declare_var(&name, ty, false);
            if self.check(TokenKind::Sym(b'=')) {
                self.next()?;
                self.assignment_expression(code)?;
                code.push_opcode(Op::StoreLocal, var, line);
            } else {
                code.push_opcode(Op::StoreDef, var, line);
            }
            if !self.check(TokenKind::Sym(b',')) {
                break;
            }
            self.next()?;
            if !self.check(TokenKind::Identifier) {
                return Err(self.err("missing identifier name."));
            }
            name = self.lexeme();
            self.next()?;
        }
        self.end_statement()
    }

    /// function-definition: the header was parsed by the caller.
    fn function_definition(
        &mut self,
        code: &mut Code,
        ret_type: TypeTag,
        name: &str,
    ) -> Result<(), SyntaxError> {
        // '(' already current.
        self.next()?;
        let mut sub = Code::new(&self.path, name);

        // parameter-list
        if !self.check(TokenKind::Sym(b')')) {
            loop {
                let Some(param_type) = self.parse_type(false)? else {
                    return Err(self.err("unknown parameter type."));
                };
                if param_type == TypeTag::VOID {
                    return Err(self.err("parameter can not be a void."));
                }
                if !self.check(TokenKind::Identifier) {
                    return Err(self.err("missing parameter name."));
                }
                let pname = self.lexeme();
                sub.declare_var(&pname, param_type, true);
                self.next()?;
                if !self.check(TokenKind::Sym(b',')) {
                    break;
                }
                self.next()?;
            }
        }
        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;

        let body_line = self.line();
        if !self.check(TokenKind::Sym(b'{')) {
            return Err(self.err("missing '{' in function definition."));
        }
        let argc = sub.arg_count();
        sub.set_func(body_line, ret_type);

        if argc > 0 {
            sub.push_opcode(Op::BindArgs, argc, body_line);
        }

        // function body
        self.compound_statement(&mut sub, &mut None)?;

        // Fall-through return: pushes the VOID dummy, which a non-void
        // function fails to cast at runtime.
        let end_line = self.line();
        let dummy = self.heap.void_obj();
        let (pos, existed) = sub.push_const(self.heap, dummy);
        if existed {
            self.heap.discard(dummy);
        }
        sub.push_opcode(Op::LoadConst, pos, end_line);
        sub.push_opcode(Op::Return, 0, end_line);

        let sub = Rc::new(sub);
        code.push_sub(Rc::clone(&sub));
        let func = self.heap.func_obj(sub);

        let line = self.line();
        let var = code.declare_var(name, TypeTag::FUNC, false);
        self.emit_const(code, func, line)?;
        code.push_opcode(Op::StoreLocal, var, line);
        Ok(())
    }

    /// external-declaration: function definition, declaration or
    /// struct/union specifier.
    fn external_declaration(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let Some(ty) = self.parse_type(true)? else {
            // Not a type: allow plain statements at module level.
            return self.statement(code, &mut None);
        };

        if self.check(TokenKind::Sym(b'{')) {
            if !ty.is_compound() {
                return Err(self.err("invalid declaration."));
            }
            return self.compound_specifier(code, ty);
        }
        if ty.is_compound() && self.check(TokenKind::Sym(b';')) {
            // Forward declaration: the tag exists, fields come later.
            return self.next();
        }

        if !self.check(TokenKind::Identifier) {
            return Err(self.err("missing identifier name."));
        }
        let name = self.lexeme();
        self.next()?;

        if self.check(TokenKind::Sym(b'(')) {
            return self.function_definition(code, ty, &name);
        }

        if ty == TypeTag::VOID {
            return Err(self.err("variable can not be a void."));
        }
        self.declaration(code, ty, name)
    }

    /// Emit `LOAD_CONST main; CALL_FUNC` when a conforming main
    /// function exists among the constants.
    fn insert_main_call(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        for i in 0..code.const_count() {
            let Some(obj) = code.get_const(i as Para) else {
                break;
            };
            let Some(func_code) = crate::object::func_code(obj) else {
                continue;
            };
            if func_code.name() != "main" {
                continue;
            }
            if func_code.ret_type() != TypeTag::INT {
                return Err(self.err("main func must return int."));
            }
            if func_code.arg_count() != 0 {
                return Err(self.err("main func must receive no argument."));
            }
            let line = self.line();
            code.push_opcode(Op::LoadConst, i as Para, line);
            code.push_opcode(Op::CallFunc, 0, line);
            code.push_opcode(Op::PopStack, 0, line);
            break;
        }
        Ok(())
    }

    /// translation-unit: external declarations and statements until
    /// the stream ends, then the main call and END_PROGRAM.
    pub fn translation_unit(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        while !self.check(TokenKind::End) {
            self.external_declaration(code)?;
        }
        self.insert_main_call(code)?;
        let line = self.line();
        code.push_opcode(Op::EndProgram, 0, line);
        for meta in &self.metas {
            if code.find_compound(meta.tag).is_none() {
                code.push_meta(Rc::clone(meta));
            }
        }
        self.lexer.close();
        Ok(())
    }

    /// command-line-unit: one external declaration or statement, for
    /// the REPL. The trailing ';' may be omitted.
    pub fn command_line(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.cmdline = true;
        if self.check(TokenKind::End) {
            return Ok(());
        }
        self.external_declaration(code)?;
        for meta in &self.metas {
            if code.find_compound(meta.tag).is_none() {
                code.push_meta(Rc::clone(meta));
            }
        }
        Ok(())
    }
}

/// Compile a source file into a module code unit.
pub fn compile_file(heap: &mut Heap, path: &Path) -> Result<Code, SyntaxError> {
    let source = FileSource::open(path).map_err(|e| SyntaxError {
        path: path.display().to_string(),
        line: 0,
        msg: format!("can not open file: {e}."),
    })?;
    let mut code = Code::new(&path.display().to_string(), GLOBAL_NAME);
    let mut parser = Parser::new(heap, Box::new(source), &path.display().to_string())?;
    parser.translation_unit(&mut code)?;
    Ok(code)
}

/// Compile in-memory source text into a module code unit.
pub fn compile_source(heap: &mut Heap, text: &str, path: &str) -> Result<Code, SyntaxError> {
    let mut code = Code::new(path, GLOBAL_NAME);
    let mut parser = Parser::new(heap, Box::new(StrSource::new(text)), path)?;
    parser.translation_unit(&mut code)?;
    Ok(code)
}

/// Compile one REPL statement against the persistent top code.
/// On error the code is rolled back to its pre-statement length.
pub fn compile_statement(
    heap: &mut Heap,
    code: &mut Code,
    text: &str,
) -> Result<(), SyntaxError> {
    let rollback = code.current_pos();
    let mut parser = match Parser::new(heap, Box::new(StrSource::new(text)), "stdin") {
        Ok(p) => p,
        Err(e) => {
            code.truncate_to(rollback);
            return Err(e);
        }
    };
    parser.adopt_metas(code);
    match parser.command_line(code) {
        Ok(()) => Ok(()),
        Err(e) => {
            code.truncate_to(rollback);
            Err(e)
        }
    }
}
