// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The koa command-line driver.
//!
//! `koa file.k` runs a script, using the `.b` bytecode cache next to
//! the source when it is newer. Without a file an interactive REPL
//! starts. `-p` prints the compiled code instead of running it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use koa_vm::code::binary;
use koa_vm::compiler;
use koa_vm::interp::Interp;
use koa_vm::repl;

#[derive(Parser)]
#[command(name = "koa", about = "The koa language", disable_version_flag = true)]
struct Cli {
    /// Script to run; omit to start the REPL.
    file: Option<PathBuf>,

    /// Print the compiled bytecode and exit.
    #[arg(short = 'p', long = "print")]
    print: bool,

    /// Print version and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.version {
        println!("koa {}", koa_vm::VERSION);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(file) = cli.file else {
        if cli.print {
            bail!("--print requires a file");
        }
        return Ok(ExitCode::from(repl::run() as u8));
    };

    let mut interp = Interp::new();

    // A fresh enough cache skips the parse; otherwise compile and
    // refresh it.
    let code = match binary::load_cache(&mut interp.heap, &file) {
        Some(code) => code,
        None => {
            let code = compiler::compile_file(&mut interp.heap, &file)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("failed to compile {}", file.display()))?;
            if let Err(err) = binary::save_cache(&code, &file) {
                tracing::debug!(%err, "could not write bytecode cache");
            }
            code
        }
    };

    if cli.print {
        print!("{}", code.disassemble());
        return Ok(ExitCode::SUCCESS);
    }

    let status = interp.execute_module(Rc::new(code));
    Ok(ExitCode::from(status as u8))
}
