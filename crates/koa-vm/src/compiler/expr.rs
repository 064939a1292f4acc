// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Expression lowering.
//!
//! Precedence, high to low: primary, postfix, unary/cast,
//! multiplicative, additive, shift, relational, equality, bitwise
//! and/xor/or, logical and/or, conditional, assignment
//! (right-associative), comma.
//!
//! Assignment targets are recognized from the opcode just emitted for
//! the left-hand side: a trailing LOAD_VAR, LOAD_INDEX or LOAD_MEMBER
//! marks a variable, subscript or member target. The load is removed,
//! the value expression is compiled, and for subscript and member
//! targets the value's opcodes are rotated in front of the target's so
//! the operands pop in store order.

use crate::code::{Code, Op, Para};
use crate::lexer::TokenKind;
use crate::object::vecobj;
use crate::types::TypeTag;

use super::{Parser, SyntaxError};

/// Assignment target classes.
enum Target {
    Var(Para),
    Index,
    Member(Para),
}

impl Parser<'_> {
    /// expression: `assignment (',' assignment)*`. Every value but the
    /// last is popped.
    pub(crate) fn expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.assignment_expression(code)?;
        while self.check(TokenKind::Sym(b',')) {
            let line = self.line();
            code.push_opcode(Op::PopStack, 0, line);
            self.next()?;
            self.assignment_expression(code)?;
        }
        Ok(())
    }

    /// assignment: `conditional` or `target assignment-op assignment`.
    pub(crate) fn assignment_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let start = code.current_pos();
        self.conditional_expression(code)?;

        if !self.token.kind.is_assign() {
            return Ok(());
        }
        let op_token = self.token.kind;
        let line = self.line();

        let target = match code.last_opcode() {
            Some((Op::LoadVar, v)) => {
                code.pop_opcode();
                Target::Var(v)
            }
            Some((Op::LoadIndex, _)) => {
                code.pop_opcode();
                Target::Index
            }
            Some((Op::LoadMember, m)) => {
                code.pop_opcode();
                Target::Member(m)
            }
            _ => return Err(self.err("invalid assignment target.")),
        };
        let mid = code.current_pos();

        self.next()?;
        self.assignment_expression(code)?;

        // Subscript and member stores pop the value last; move its
        // opcodes in front of the target's.
        if !matches!(target, Target::Var(_)) {
            code.rotate_tail(start, mid);
        }

        let op = assign_op(op_token, &target);
        let para = match target {
            Target::Var(v) | Target::Member(v) => v,
            Target::Index => 0,
        };
        code.push_opcode(op, para, line);
        Ok(())
    }

    /// conditional: `logical-or ('?' expression ':' conditional)?`.
    /// Both branches evaluate; CON_SEL picks one.
    fn conditional_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.logical_or_expression(code)?;
        if !self.check(TokenKind::Sym(b'?')) {
            return Ok(());
        }
        let line = self.line();
        self.next()?;
        self.expression(code)?;
        self.expect(TokenKind::Sym(b':'), "missing ':' in conditional expression.")?;
        self.conditional_expression(code)?;
        code.push_opcode(Op::ConSel, 0, line);
        Ok(())
    }

    fn logical_or_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.logical_and_expression(code)?;
        while self.check(TokenKind::Lor) {
            let line = self.line();
            self.next()?;
            self.logical_and_expression(code)?;
            code.push_opcode(Op::LogicOr, 0, line);
        }
        Ok(())
    }

    fn logical_and_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.inclusive_or_expression(code)?;
        while self.check(TokenKind::Land) {
            let line = self.line();
            self.next()?;
            self.inclusive_or_expression(code)?;
            code.push_opcode(Op::LogicAnd, 0, line);
        }
        Ok(())
    }

    fn inclusive_or_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.exclusive_or_expression(code)?;
        while self.check(TokenKind::Sym(b'|')) {
            let line = self.line();
            self.next()?;
            self.exclusive_or_expression(code)?;
            code.push_opcode(Op::BitOr, 0, line);
        }
        Ok(())
    }

    fn exclusive_or_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.and_expression(code)?;
        while self.check(TokenKind::Sym(b'^')) {
            let line = self.line();
            self.next()?;
            self.and_expression(code)?;
            code.push_opcode(Op::BitXor, 0, line);
        }
        Ok(())
    }

    fn and_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.equality_expression(code)?;
        while self.check(TokenKind::Sym(b'&')) {
            let line = self.line();
            self.next()?;
            self.equality_expression(code)?;
            code.push_opcode(Op::BitAnd, 0, line);
        }
        Ok(())
    }

    fn equality_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.relational_expression(code)?;
        loop {
            let op = match self.token.kind {
                TokenKind::Eq => Op::Equal,
                TokenKind::Neq => Op::NotEqual,
                _ => return Ok(()),
            };
            let line = self.line();
            self.next()?;
            self.relational_expression(code)?;
            code.push_opcode(op, 0, line);
        }
    }

    fn relational_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.shift_expression(code)?;
        loop {
            let op = match self.token.kind {
                TokenKind::Sym(b'<') => Op::LessThan,
                TokenKind::Sym(b'>') => Op::LargerThan,
                TokenKind::LeEq => Op::LessEqual,
                TokenKind::LaEq => Op::LargerEqual,
                _ => return Ok(()),
            };
            let line = self.line();
            self.next()?;
            self.shift_expression(code)?;
            code.push_opcode(op, 0, line);
        }
    }

    fn shift_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.additive_expression(code)?;
        loop {
            let op = match self.token.kind {
                TokenKind::Lshift => Op::LeftShift,
                TokenKind::Rshift => Op::RightShift,
                _ => return Ok(()),
            };
            let line = self.line();
            self.next()?;
            self.additive_expression(code)?;
            code.push_opcode(op, 0, line);
        }
    }

    fn additive_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.multiplicative_expression(code)?;
        loop {
            let op = match self.token.kind {
                TokenKind::Sym(b'+') => Op::Add,
                TokenKind::Sym(b'-') => Op::Sub,
                _ => return Ok(()),
            };
            let line = self.line();
            self.next()?;
            self.multiplicative_expression(code)?;
            code.push_opcode(op, 0, line);
        }
    }

    fn multiplicative_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        self.cast_expression(code)?;
        loop {
            let op = match self.token.kind {
                TokenKind::Sym(b'*') => Op::Mul,
                TokenKind::Sym(b'/') => Op::Div,
                TokenKind::Sym(b'%') => Op::Mod,
                _ => return Ok(()),
            };
            let line = self.line();
            self.next()?;
            self.cast_expression(code)?;
            code.push_opcode(op, 0, line);
        }
    }

    /// cast: `'(' type ')' cast` or a unary expression. A parenthesis
    /// not followed by a type name is a grouped expression.
    pub(crate) fn cast_expression(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        if self.check(TokenKind::Sym(b'(')) {
            let line = self.line();
            self.next()?;
            if self.token.kind.is_type() {
                let Some(ty) = self.parse_type(false)? else {
                    return Err(self.err("unknown type."));
                };
                if ty == TypeTag::VOID {
                    return Err(self.err("can not cast to void."));
                }
                self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;
                self.cast_expression(code)?;
                code.push_opcode(Op::TypeCast, ty.0 as Para, line);
                return Ok(());
            }
            return self.unary_expression(code, true);
        }
        self.unary_expression(code, false)
    }

    /// unary: prefix operators, or a postfix expression.
    fn unary_expression(&mut self, code: &mut Code, leading_par: bool) -> Result<(), SyntaxError> {
        if leading_par {
            return self.postfix_expression(code, true);
        }
        let line = self.line();
        match self.token.kind {
            TokenKind::Sym(b'-') => {
                self.next()?;
                self.cast_expression(code)?;
                code.push_opcode(Op::Negative, 0, line);
                Ok(())
            }
            TokenKind::Sym(b'~') => {
                self.next()?;
                self.cast_expression(code)?;
                code.push_opcode(Op::BitNot, 0, line);
                Ok(())
            }
            TokenKind::Sym(b'!') => {
                self.next()?;
                self.cast_expression(code)?;
                code.push_opcode(Op::LogicNot, 0, line);
                Ok(())
            }
            TokenKind::Inc => {
                self.next()?;
                self.unary_expression(code, false)?;
                self.convert_step(code, Op::VarInc, Op::IndexInc, Op::MemberInc)
            }
            TokenKind::Dec => {
                self.next()?;
                self.unary_expression(code, false)?;
                self.convert_step(code, Op::VarDec, Op::IndexDec, Op::MemberDec)
            }
            _ => self.postfix_expression(code, false),
        }
    }

    /// Turn a trailing load into an increment/decrement opcode.
    fn convert_step(
        &mut self,
        code: &mut Code,
        var_op: Op,
        index_op: Op,
        member_op: Op,
    ) -> Result<(), SyntaxError> {
        let line = self.line();
        match code.last_opcode() {
            Some((Op::LoadVar, v)) => {
                code.pop_opcode();
                code.push_opcode(var_op, v, line);
                Ok(())
            }
            Some((Op::LoadIndex, _)) => {
                code.pop_opcode();
                code.push_opcode(index_op, 0, line);
                Ok(())
            }
            Some((Op::LoadMember, m)) => {
                code.pop_opcode();
                code.push_opcode(member_op, m, line);
                Ok(())
            }
            _ => Err(self.err("invalid operand for '++' or '--'.")),
        }
    }

    /// postfix: primary followed by member access, subscripts, calls
    /// and post-increment operators.
    fn postfix_expression(&mut self, code: &mut Code, leading_par: bool) -> Result<(), SyntaxError> {
        self.primary_expression(code, leading_par)?;
        loop {
            let line = self.line();
            match self.token.kind {
                TokenKind::Sym(b'.') => {
                    self.next()?;
                    if !self.check(TokenKind::Identifier) {
                        return Err(self.err("missing member name."));
                    }
                    let vi = code.var_index(&self.lexeme());
                    self.next()?;
                    code.push_opcode(Op::LoadMember, vi, line);
                }
                TokenKind::Sym(b'[') => {
                    self.next()?;
                    self.expression(code)?;
                    self.expect(TokenKind::Sym(b']'), "missing matching ']'.")?;
                    code.push_opcode(Op::LoadIndex, 0, line);
                }
                TokenKind::Sym(b'(') => {
                    self.next()?;
                    if self.check(TokenKind::Sym(b')')) {
                        self.next()?;
                        code.push_opcode(Op::CallFunc, 0, line);
                    } else {
                        let mut argc: Para = 0;
                        loop {
                            self.assignment_expression(code)?;
                            argc += 1;
                            if !self.check(TokenKind::Sym(b',')) {
                                break;
                            }
                            self.next()?;
                        }
                        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;
                        code.push_opcode(Op::MakeVec, argc, line);
                        code.push_opcode(Op::CallFunc, 0, line);
                    }
                }
                TokenKind::Inc => {
                    self.next()?;
                    self.convert_step(code, Op::VarPoinc, Op::IndexPoinc, Op::MemberPoinc)?;
                }
                TokenKind::Dec => {
                    self.next()?;
                    self.convert_step(code, Op::VarPodec, Op::IndexPodec, Op::MemberPodec)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// primary: identifier, literal, vec constant or parenthesized
    /// expression.
    fn primary_expression(&mut self, code: &mut Code, leading_par: bool) -> Result<(), SyntaxError> {
        if leading_par {
            self.expression(code)?;
            return self.expect(TokenKind::Sym(b')'), "missing matching ')'.");
        }
        let line = self.line();
        match self.token.kind {
            TokenKind::Identifier => {
                let vi = code.var_index(&self.lexeme());
                self.next()?;
                code.push_opcode(Op::LoadVar, vi, line);
                Ok(())
            }
            TokenKind::Null => {
                self.next()?;
                let obj = self.heap.null_obj();
                self.emit_const(code, obj, line)
            }
            TokenKind::True | TokenKind::False => {
                let value = self.check(TokenKind::True);
                self.next()?;
                let obj = self.heap.bool_obj(value);
                self.emit_const(code, obj, line)
            }
            TokenKind::Integer | TokenKind::HexInt | TokenKind::LInteger => {
                let obj = self.integer_literal()?;
                self.next()?;
                self.emit_const(code, obj, line)
            }
            TokenKind::Floating | TokenKind::Expo => {
                let value: f64 = self
                    .lexeme()
                    .parse()
                    .map_err(|_| self.err("broken floating constant."))?;
                self.next()?;
                let obj = self.heap.double_obj(value);
                self.emit_const(code, obj, line)
            }
            TokenKind::Character => {
                let byte = self.lexeme().bytes().next().unwrap_or(0);
                self.next()?;
                let obj = self.heap.char_obj(byte);
                self.emit_const(code, obj, line)
            }
            TokenKind::String => {
                let text = self.lexeme();
                self.next()?;
                let obj = self.heap.str_obj(text.as_bytes());
                self.emit_const(code, obj, line)
            }
            TokenKind::Sym(b'[') => {
                let obj = self.vec_constant()?;
                self.emit_const(code, obj, line)
            }
            TokenKind::Sym(b'(') => {
                self.next()?;
                self.expression(code)?;
                self.expect(TokenKind::Sym(b')'), "missing matching ')'.")
            }
            _ => Err(self.err("invalid primary expression.")),
        }
    }

    /// Parse the current integer token into an INT or LONG object.
    fn integer_literal(&mut self) -> Result<crate::object::ObjRef, SyntaxError> {
        let text = self.lexeme();
        let force_long = self.check(TokenKind::LInteger);
        let value = if self.check(TokenKind::HexInt) {
            i64::from_str_radix(text.trim_start_matches("0x").trim_start_matches("0X"), 16)
        } else {
            text.parse::<i64>()
        }
        .map_err(|_| self.err("broken integer constant."))?;

        Ok(
            if force_long || value > i64::from(i32::MAX) || value < i64::from(i32::MIN) {
                self.heap.long_obj(value)
            } else {
                self.heap.int_obj(value as i32)
            },
        )
    }

    /// vec constant: a bracketed list of literals and nested vec
    /// constants, built as a compile-time object.
    fn vec_constant(&mut self) -> Result<crate::object::ObjRef, SyntaxError> {
        // Skip '['.
        self.next()?;
        let vec = self.heap.vec_obj(Vec::new());
        while !self.check(TokenKind::Sym(b']')) {
            let element = match self.token.kind {
                TokenKind::Null => {
                    self.next()?;
                    self.heap.null_obj()
                }
                TokenKind::True | TokenKind::False => {
                    let value = self.check(TokenKind::True);
                    self.next()?;
                    self.heap.bool_obj(value)
                }
                TokenKind::Integer | TokenKind::HexInt | TokenKind::LInteger => {
                    let obj = self.integer_literal()?;
                    self.next()?;
                    obj
                }
                TokenKind::Floating | TokenKind::Expo => {
                    let value: f64 = self
                        .lexeme()
                        .parse()
                        .map_err(|_| self.err("broken floating constant."))?;
                    self.next()?;
                    self.heap.double_obj(value)
                }
                TokenKind::Character => {
                    let byte = self.lexeme().bytes().next().unwrap_or(0);
                    self.next()?;
                    self.heap.char_obj(byte)
                }
                TokenKind::String => {
                    let text = self.lexeme();
                    self.next()?;
                    self.heap.str_obj(text.as_bytes())
                }
                TokenKind::Sym(b'[') => self.vec_constant()?,
                TokenKind::Sym(b',') => {
                    self.next()?;
                    continue;
                }
                _ => return Err(self.err("invalid vec constant.")),
            };
            vecobj::push(vec, element);
            self.heap.discard(element);
        }
        // Skip ']'.
        self.next()?;
        Ok(vec)
    }
}

/// Opcode of an assignment operator against a target class.
fn assign_op(token: TokenKind, target: &Target) -> Op {
    match target {
        Target::Var(_) => match token {
            TokenKind::IpMul => Op::VarIpMul,
            TokenKind::IpDiv => Op::VarIpDiv,
            TokenKind::IpMod => Op::VarIpMod,
            TokenKind::IpAdd => Op::VarIpAdd,
            TokenKind::IpSub => Op::VarIpSub,
            TokenKind::IpLs => Op::VarIpLs,
            TokenKind::IpRs => Op::VarIpRs,
            TokenKind::IpAnd => Op::VarIpAnd,
            TokenKind::IpXor => Op::VarIpXor,
            TokenKind::IpOr => Op::VarIpOr,
            _ => Op::StoreVar,
        },
        Target::Index => match token {
            TokenKind::IpMul => Op::IndexIpMul,
            TokenKind::IpDiv => Op::IndexIpDiv,
            TokenKind::IpMod => Op::IndexIpMod,
            TokenKind::IpAdd => Op::IndexIpAdd,
            TokenKind::IpSub => Op::IndexIpSub,
            TokenKind::IpLs => Op::IndexIpLs,
            TokenKind::IpRs => Op::IndexIpRs,
            TokenKind::IpAnd => Op::IndexIpAnd,
            TokenKind::IpXor => Op::IndexIpXor,
            TokenKind::IpOr => Op::IndexIpOr,
            _ => Op::StoreIndex,
        },
        Target::Member(_) => match token {
            TokenKind::IpMul => Op::MemberIpMul,
            TokenKind::IpDiv => Op::MemberIpDiv,
            TokenKind::IpMod => Op::MemberIpMod,
            TokenKind::IpAdd => Op::MemberIpAdd,
            TokenKind::IpSub => Op::MemberIpSub,
            TokenKind::IpLs => Op::MemberIpLs,
            TokenKind::IpRs => Op::MemberIpRs,
            TokenKind::IpAnd => Op::MemberIpAnd,
            TokenKind::IpXor => Op::MemberIpXor,
            TokenKind::IpOr => Op::MemberIpOr,
            _ => Op::StoreMember,
        },
    }
}
