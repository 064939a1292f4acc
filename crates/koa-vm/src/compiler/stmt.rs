// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Statement lowering.
//!
//! Control flow is emit-then-patch: forward jumps carry the PENDING
//! sentinel until their target exists. `break` and `continue` leave
//! the blocks they are nested in with POP_BLOCKS, counted by scanning
//! the emitted block opcodes back to the construct's entry.
//!
//! A `switch` body is emitted in source order, then physically
//! reordered: every case comparison moves to the block entry, chained
//! so the switch value tests against each label in emission order and
//! falls through to `default`. The reordering rewrites every jump
//! whose target crossed the moved ranges.

use crate::code::{Code, Op, Para};
use crate::lexer::TokenKind;
use crate::types::TypeTag;

use super::{Parser, SyntaxError, Upper, UpperKind, PENDING};

impl Parser<'_> {
    /// statement: labeled, compound, expression, selection, iteration,
    /// jump or try statement.
    pub(crate) fn statement(
        &mut self,
        code: &mut Code,
        upper: &mut Option<&mut Upper>,
    ) -> Result<(), SyntaxError> {
        match self.token.kind {
            TokenKind::Sym(b'{') => self.compound_statement(code, upper),
            TokenKind::If => self.if_statement(code, upper),
            TokenKind::Switch => self.switch_statement(code),
            TokenKind::While => self.while_statement(code),
            TokenKind::Do => self.do_while_statement(code),
            TokenKind::For => self.for_statement(code),
            TokenKind::Continue | TokenKind::Break | TokenKind::Return => {
                self.jump_statement(code, upper)
            }
            TokenKind::Try => self.try_statement(code),
            TokenKind::Case | TokenKind::Default => self.labeled_statement(code, upper),
            TokenKind::Sym(b';') => self.next(),
            _ if self.token.kind.is_type() => self.block_declaration(code),
            _ => self.expression_statement(code),
        }
    }

    /// Statement terminator; the REPL accepts a missing trailing ';'.
    pub(crate) fn end_statement(&mut self) -> Result<(), SyntaxError> {
        if self.cmdline && self.check(TokenKind::End) {
            return Ok(());
        }
        self.expect(TokenKind::Sym(b';'), "missing ';'.")
    }

    /// A declaration appearing as a block item.
    fn block_declaration(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let Some(ty) = self.parse_type(false)? else {
            return Err(self.err("unknown type."));
        };
        if ty == TypeTag::VOID {
            return Err(self.err("variable can not be a void."));
        }
        if !self.check(TokenKind::Identifier) {
            return Err(self.err("missing identifier name."));
        }
        let name = self.lexeme();
        self.next()?;
        if self.check(TokenKind::Sym(b'(')) {
            return Err(self.err("nested function definition."));
        }
        self.declaration(code, ty, name)
    }

    /// compound: `'{' block-items '}'` wrapped in its own block.
    pub(crate) fn compound_statement(
        &mut self,
        code: &mut Code,
        upper: &mut Option<&mut Upper>,
    ) -> Result<(), SyntaxError> {
        let line = self.line();
        self.expect(TokenKind::Sym(b'{'), "missing '{'.")?;
        code.push_opcode(Op::EnterBlock, 0, line);
        while !self.check(TokenKind::Sym(b'}')) {
            if self.check(TokenKind::End) {
                return Err(self.err("missing matching '}'."));
            }
            self.statement(code, upper)?;
        }
        let line = self.line();
        code.push_opcode(Op::LeaveBlock, 0, line);
        self.next()
    }

    /// if: `if '(' expr ')' statement (else statement)?`.
    fn if_statement(
        &mut self,
        code: &mut Code,
        upper: &mut Option<&mut Upper>,
    ) -> Result<(), SyntaxError> {
        let line = self.line();
        self.next()?;
        self.expect(TokenKind::Sym(b'('), "missing '(' after if.")?;
        self.expression(code)?;
        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;
        let jf = code.push_opcode(Op::JumpFalse, PENDING, line);
        self.statement(code, upper)?;
        if self.check(TokenKind::Else) {
            let else_line = self.line();
            self.next()?;
            let jo = code.push_opcode(Op::JumpForce, PENDING, else_line);
            code.modify_opcode(jf, Op::JumpFalse, code.current_pos());
            self.statement(code, upper)?;
            code.modify_opcode(jo, Op::JumpForce, code.current_pos());
        } else {
            code.modify_opcode(jf, Op::JumpFalse, code.current_pos());
        }
        Ok(())
    }

    /// while: condition at the loop head, body, jump back.
    fn while_statement(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let line = self.line();
        let enter = code.push_opcode(Op::EnterBlock, 0, line);
        self.next()?;
        let cond_pos = code.current_pos();
        self.expect(TokenKind::Sym(b'('), "missing '(' after while.")?;
        self.expression(code)?;
        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;
        let jf = code.push_opcode(Op::JumpFalse, PENDING, line);

        let mut upper = Upper::new(UpperKind::Loop, enter);
        {
            let mut inner = Some(&mut upper);
            self.statement(code, &mut inner)?;
        }
        let back_line = self.line();
        code.push_opcode(Op::JumpForce, cond_pos, back_line);
        let leave = code.push_opcode(Op::LeaveBlock, 0, back_line);
        code.modify_opcode(jf, Op::JumpFalse, leave);
        patch_jumps(code, &upper.breaks, leave + 1);
        patch_jumps(code, &upper.continues, cond_pos);
        Ok(())
    }

    /// do-while: body first, condition at the tail.
    fn do_while_statement(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let line = self.line();
        let enter = code.push_opcode(Op::EnterBlock, 0, line);
        self.next()?;
        let body_pos = code.current_pos();

        let mut upper = Upper::new(UpperKind::Loop, enter);
        {
            let mut inner = Some(&mut upper);
            self.statement(code, &mut inner)?;
        }
        let cond_pos = code.current_pos();
        self.expect(TokenKind::While, "missing while after do statement.")?;
        self.expect(TokenKind::Sym(b'('), "missing '(' after while.")?;
        self.expression(code)?;
        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;
        self.end_statement()?;
        let tail_line = self.line();
        code.push_opcode(Op::JumpTrue, body_pos, tail_line);
        let leave = code.push_opcode(Op::LeaveBlock, 0, tail_line);
        patch_jumps(code, &upper.breaks, leave + 1);
        patch_jumps(code, &upper.continues, cond_pos);
        Ok(())
    }

    /// for: init, condition, increment (emitted ahead of the body and
    /// entered from its tail), body.
    fn for_statement(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let line = self.line();
        let enter = code.push_opcode(Op::EnterBlock, 0, line);
        self.next()?;
        self.expect(TokenKind::Sym(b'('), "missing '(' after for.")?;

        // init clause
        if self.check(TokenKind::Sym(b';')) {
            self.next()?;
        } else if self.token.kind.is_type() {
            self.block_declaration(code)?;
        } else {
            self.expression(code)?;
            code.push_opcode(Op::PopStack, 0, line);
            self.expect(TokenKind::Sym(b';'), "missing ';'.")?;
        }

        // condition clause
        let cond_pos = code.current_pos();
        let jf = if self.check(TokenKind::Sym(b';')) {
            self.next()?;
            None
        } else {
            self.expression(code)?;
            self.expect(TokenKind::Sym(b';'), "missing ';'.")?;
            Some(code.push_opcode(Op::JumpFalse, PENDING, line))
        };

        // increment clause, skipped on the first pass
        let (inc_pos, skip) = if self.check(TokenKind::Sym(b')')) {
            self.next()?;
            (cond_pos, None)
        } else {
            let skip = code.push_opcode(Op::JumpForce, PENDING, line);
            let inc_pos = code.current_pos();
            self.expression(code)?;
            code.push_opcode(Op::PopStack, 0, line);
            code.push_opcode(Op::JumpForce, cond_pos, line);
            self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;
            (inc_pos, Some(skip))
        };
        if let Some(skip) = skip {
            code.modify_opcode(skip, Op::JumpForce, code.current_pos());
        }

        let mut upper = Upper::new(UpperKind::Loop, enter);
        {
            let mut inner = Some(&mut upper);
            self.statement(code, &mut inner)?;
        }
        let tail_line = self.line();
        code.push_opcode(Op::JumpForce, inc_pos, tail_line);
        let leave = code.push_opcode(Op::LeaveBlock, 0, tail_line);
        if let Some(jf) = jf {
            code.modify_opcode(jf, Op::JumpFalse, leave);
        }
        patch_jumps(code, &upper.breaks, leave + 1);
        patch_jumps(code, &upper.continues, inc_pos);
        Ok(())
    }

    /// labeled: `case expr ':'` or `default ':'`, valid only inside a
    /// switch body.
    fn labeled_statement(
        &mut self,
        code: &mut Code,
        upper: &mut Option<&mut Upper>,
    ) -> Result<(), SyntaxError> {
        let is_case = self.check(TokenKind::Case);
        {
            let Some(u) = upper.as_deref_mut() else {
                return Err(self.err("invalid labeled statement."));
            };
            if u.kind != UpperKind::Switch {
                return Err(self.err("invalid labeled statement."));
            }
            let line = self.line();
            self.next()?;
            if is_case {
                let cmp_start = code.current_pos();
                self.assignment_expression(code)?;
                self.expect(TokenKind::Sym(b':'), "missing ':' after case.")?;
                let jc = code.push_opcode(Op::JumpCase, PENDING, line);
                u.cases.push((cmp_start, jc + 1));
            } else {
                self.expect(TokenKind::Sym(b':'), "missing ':' after default.")?;
                if u.default_pos.is_some() {
                    return Err(self.err("duplicated default label."));
                }
                u.default_pos = Some(code.current_pos());
            }
        }
        // The labeled statement body follows.
        self.statement(code, upper)
    }

    /// switch: evaluate the value, emit the body in order, then hoist
    /// the case comparisons to the entry.
    fn switch_statement(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let line = self.line();
        let enter = code.push_opcode(Op::EnterBlock, 0, line);
        self.next()?;
        self.expect(TokenKind::Sym(b'('), "missing '(' after switch.")?;
        self.expression(code)?;
        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;

        let body_start = code.current_pos();
        self.expect(TokenKind::Sym(b'{'), "missing '{' after switch.")?;
        let mut upper = Upper::new(UpperKind::Switch, enter);
        while !self.check(TokenKind::Sym(b'}')) {
            if self.check(TokenKind::End) {
                return Err(self.err("missing matching '}'."));
            }
            let mut inner = Some(&mut upper);
            self.statement(code, &mut inner)?;
        }
        self.next()?;

        reorder_switch(code, body_start, &mut upper);

        let tail_line = self.line();
        let leave = code.push_opcode(Op::LeaveBlock, 0, tail_line);
        patch_jumps(code, &upper.breaks, leave + 1);
        Ok(())
    }

    /// jump: `continue ';'`, `break ';'` or `return expr? ';'`.
    fn jump_statement(
        &mut self,
        code: &mut Code,
        upper: &mut Option<&mut Upper>,
    ) -> Result<(), SyntaxError> {
        let line = self.line();
        match self.token.kind {
            TokenKind::Continue => {
                self.next()?;
                let Some(u) = upper.as_deref_mut() else {
                    return Err(self.err("invalid jump statement."));
                };
                if u.kind != UpperKind::Loop {
                    return Err(self.err("invalid jump statement."));
                }
                // Leave the blocks opened inside the loop body.
                let blocks = count_blocks(code, u.enter_pos + 1);
                code.push_opcode(Op::PopBlocks, blocks, line);
                let jc = code.push_opcode(Op::JumpContinue, PENDING, line);
                u.continues.push(jc);
                self.end_statement()
            }
            TokenKind::Break => {
                self.next()?;
                let Some(u) = upper.as_deref_mut() else {
                    return Err(self.err("invalid jump statement."));
                };
                // Leave the construct's block too; the target sits
                // past its LEAVE_BLOCK.
                let blocks = count_blocks(code, u.enter_pos);
                code.push_opcode(Op::PopBlocks, blocks, line);
                let jb = code.push_opcode(Op::JumpBreak, PENDING, line);
                u.breaks.push(jb);
                self.end_statement()
            }
            TokenKind::Return => {
                self.next()?;
                if self.check(TokenKind::Sym(b';')) {
                    if code.ret_type() != TypeTag::VOID {
                        return Err(self.err("non-void func need return a value."));
                    }
                    self.next()?;
                    let dummy = self.heap.void_obj();
                    self.emit_const(code, dummy, line)?;
                    code.push_opcode(Op::Return, 0, line);
                    Ok(())
                } else {
                    if code.is_func() && code.ret_type() == TypeTag::VOID {
                        return Err(self.err("void func can not return a value."));
                    }
                    self.expression(code)?;
                    code.push_opcode(Op::Return, 0, line);
                    self.end_statement()
                }
            }
            _ => Err(self.err("invalid jump statement.")),
        }
    }

    /// try: the try block's ENTER_BLOCK carries the handler address;
    /// normal completion jumps over the catch section.
    fn try_statement(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let line = self.line();
        let enter = code.push_opcode(Op::EnterBlock, PENDING, line);
        self.next()?;
        self.expect(TokenKind::Sym(b'{'), "missing '{' after try statement.")?;
        while !self.check(TokenKind::Sym(b'}')) {
            if self.check(TokenKind::End) {
                return Err(self.err("missing matching '}'."));
            }
            let mut inner = None;
            self.statement(code, &mut inner)?;
        }
        self.next()?;
        let leave_line = self.line();
        code.push_opcode(Op::LeaveBlock, 0, leave_line);

        if !self.check(TokenKind::Catch) {
            code.modify_opcode(enter, Op::EnterBlock, code.current_pos());
            return Ok(());
        }

        let skip = code.push_opcode(Op::JumpForce, PENDING, leave_line);
        code.modify_opcode(enter, Op::EnterBlock, code.current_pos());

        self.next()?;
        self.expect(TokenKind::Sym(b'('), "missing '(' after catch.")?;
        self.expect(TokenKind::Exception, "missing exception.")?;
        if !self.check(TokenKind::Identifier) {
            return Err(self.err("missing identifier."));
        }
        let name = self.lexeme();
        self.next()?;
        self.expect(TokenKind::Sym(b')'), "missing matching ')'.")?;

        let catch_line = self.line();
        let var = code.declare_var(&name, TypeTag::EXCEPTION, false);
        code.push_opcode(Op::EnterBlock, 0, catch_line);
        code.push_opcode(Op::StoreException, var, catch_line);
        self.expect(TokenKind::Sym(b'{'), "missing '{' after catch statement.")?;
        while !self.check(TokenKind::Sym(b'}')) {
            if self.check(TokenKind::End) {
                return Err(self.err("missing matching '}'."));
            }
            let mut inner = None;
            self.statement(code, &mut inner)?;
        }
        self.next()?;
        let end_line = self.line();
        code.push_opcode(Op::LeaveBlock, 0, end_line);
        code.modify_opcode(skip, Op::JumpForce, code.current_pos());
        Ok(())
    }

    /// expression statement: value computed, then dropped.
    fn expression_statement(&mut self, code: &mut Code) -> Result<(), SyntaxError> {
        let line = self.line();
        self.expression(code)?;
        code.push_opcode(Op::PopStack, 0, line);
        self.end_statement()
    }
}

/// Patch a list of pending jumps to a target.
fn patch_jumps(code: &mut Code, sites: &[Para], target: Para) {
    for &pos in sites {
        if let Some((op, _)) = code.get(pos) {
            code.modify_opcode(pos, op, target);
        }
    }
}

/// Net count of blocks opened between `from` and the current position.
fn count_blocks(code: &Code, from: Para) -> Para {
    let mut blocks: i64 = 0;
    for pos in from..code.current_pos() {
        match code.get(pos) {
            Some((Op::EnterBlock, _)) => blocks += 1,
            Some((Op::LeaveBlock, _)) => blocks -= 1,
            Some((Op::PushBlocks, n)) => blocks += i64::from(n),
            Some((Op::PopBlocks, n)) => blocks -= i64::from(n),
            _ => {}
        }
    }
    blocks.max(0) as Para
}

/// Hoist the case comparisons of a switch body to its entry.
///
/// The body span `[body_start, end)` is rewritten as: all case
/// comparison regions in order, each followed by a JUMP_FORCE into its
/// body, then a JUMP_DEFAULT, then the remaining body instructions.
/// Every jump whose target crossed a moved range is adjusted, and the
/// pending break sites in `upper` are relocated.
fn reorder_switch(code: &mut Code, body_start: Para, upper: &mut Upper) {
    if upper.cases.is_empty() && upper.default_pos.is_none() {
        // Value never tested: drop it through a default jump to the
        // block end.
        let end = code.current_pos();
        code.push_opcode(Op::JumpDefault, end + 1, code.get_line(body_start));
        return;
    }

    let end = code.current_pos();
    let span_len = (end - body_start) as usize;
    let old: Vec<(u32, u32)> = (0..span_len)
        .map(|i| {
            let pos = body_start + i as Para;
            (code.raw(pos), code.get_line(pos))
        })
        .collect();

    let in_case = |pos: Para| {
        upper
            .cases
            .iter()
            .any(|&(s, e)| pos >= s && pos < e)
    };

    // New order: case regions (each plus a synthetic JUMP_FORCE),
    // one synthetic JUMP_DEFAULT, then the residual body.
    #[derive(Clone, Copy)]
    enum Item {
        Old(Para),
        CaseJump(usize),
        DefaultJump,
    }
    let mut items: Vec<Item> = Vec::with_capacity(span_len + upper.cases.len() + 1);
    for (k, &(s, e)) in upper.cases.iter().enumerate() {
        for pos in s..e {
            items.push(Item::Old(pos));
        }
        items.push(Item::CaseJump(k));
    }
    items.push(Item::DefaultJump);
    for i in 0..span_len {
        let pos = body_start + i as Para;
        if !in_case(pos) {
            items.push(Item::Old(pos));
        }
    }
    let new_end = body_start + items.len() as Para;

    // Map old absolute positions to new absolute positions.
    let mut map: Vec<Para> = vec![0; span_len];
    let mut default_jump_pos: Para = 0;
    for (new_idx, &item) in items.iter().enumerate() {
        match item {
            Item::Old(pos) => map[(pos - body_start) as usize] = body_start + new_idx as Para,
            Item::DefaultJump => default_jump_pos = body_start + new_idx as Para,
            Item::CaseJump(_) => {}
        }
    }
    // A position one past a case region maps to the first residual
    // instruction at or after it (fall-through into the body).
    let residual_at = |pos: Para| -> Para {
        let mut p = pos;
        while p < end {
            if !in_case(p) {
                return map[(p - body_start) as usize];
            }
            p += 1;
        }
        new_end
    };

    let replacement: Vec<(u32, u32)> = items
        .iter()
        .map(|&item| match item {
            Item::Old(pos) => {
                let (word, line) = old[(pos - body_start) as usize];
                let Some(op) = crate::code::unpack_op(word) else {
                    return (word, line);
                };
                let para = crate::code::unpack_para(word);
                // This switch's own comparisons chain to the next one,
                // then to the default jump. Jumps belonging to nested
                // constructs just get their targets relocated.
                let own_case = upper.cases.iter().position(|&(_, e)| e == pos + 1);
                if op == Op::JumpCase && own_case.is_some() {
                    let k = own_case.unwrap_or(0);
                    let target = if k + 1 < upper.cases.len() {
                        map[(upper.cases[k + 1].0 - body_start) as usize]
                    } else {
                        default_jump_pos
                    };
                    (crate::code::pack(op, target), line)
                } else if op.is_jump() && para != PENDING && para >= body_start && para < end {
                    (crate::code::pack(op, map[(para - body_start) as usize]), line)
                } else {
                    (word, line)
                }
            }
            Item::CaseJump(k) => {
                let body_pos = residual_at(upper.cases[k].1);
                (crate::code::pack(Op::JumpForce, body_pos), old[0].1)
            }
            Item::DefaultJump => {
                let target = match upper.default_pos {
                    Some(pos) => residual_at(pos),
                    None => new_end,
                };
                (crate::code::pack(Op::JumpDefault, target), old[0].1)
            }
        })
        .collect();

    code.splice_span(body_start, end, &replacement);

    // Pending break sites moved with the residual body.
    for site in &mut upper.breaks {
        *site = map[(*site - body_start) as usize];
    }
}
