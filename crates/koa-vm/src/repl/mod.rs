// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Interactive REPL.
//!
//! Reads one logical statement per input line, compiles it against the
//! persistent top code and executes it in the persistent global frame.
//! Parse errors roll the code back to its pre-statement length;
//! runtime errors print a traceback, roll the value stack back to the
//! frame base and return to the prompt.

#[cfg(test)]
mod repl_test;

use std::io::{BufRead, Write};
use std::rc::Rc;

use crate::code::Code;
use crate::compiler::{self, GLOBAL_NAME};
use crate::frame::Frame;
use crate::interp::Interp;

/// Code path shown in REPL diagnostics.
const CODE_PATH: &str = "stdin";

/// Run the interactive loop until end of input. Returns the process
/// exit status.
pub fn run() -> i32 {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    run_with(&mut input, Interp::new())
}

/// REPL loop over an arbitrary line source, for the driver and tests.
pub fn run_with<R: BufRead>(input: &mut R, mut interp: Interp) -> i32 {
    interp.cmdline = true;
    let mut code = Code::new(CODE_PATH, GLOBAL_NAME);
    let rc = Rc::new(code.clone());
    interp.global_code = Some(Rc::clone(&rc));
    interp.frames.push(Frame::new(rc, 0, true, false));

    loop {
        print!(">>> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }

        let start = code.current_pos();
        if let Err(e) = compiler::compile_statement(&mut interp.heap, &mut code, &line) {
            eprintln!("{e}");
            continue;
        }

        let rc = Rc::new(code.clone());
        interp.global_code = Some(Rc::clone(&rc));
        interp.frames[0].code = rc;
        interp.frames[0].ip = start as usize;

        // Runtime errors recover inside play in cmdline mode.
        let _ = interp.play();
        interp.flush_out();
    }
    0
}
