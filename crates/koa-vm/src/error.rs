// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Runtime error kinds.
//!
//! Every failing operation produces a [`RuntimeError`]. The interpreter
//! turns these into EXCEPTION objects and unwinds to the nearest
//! catching block; the error text becomes the exception message.
//!
//! Fatal conditions (out of memory, broken internal invariants) never
//! enter the exception machinery: [`fatal`] reports and aborts.

use thiserror::Error;

/// A recoverable runtime error.
///
/// The variants mirror the error kinds the language distinguishes;
/// the display form is the exception message shown to scripts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Wrong operand type for an operation, or an invalid cast.
    #[error("{0}")]
    Type(String),
    /// Use of an undefined variable, or redefinition of an existing one.
    #[error("{0}")]
    Name(String),
    /// VEC or STR subscript out of bounds.
    #[error("{0}")]
    Index(String),
    /// DICT key of an unhashable type.
    #[error("{0}")]
    Key(String),
    /// Division or modulus with a zero right operand.
    #[error("division by zero.")]
    ZeroDivision,
    /// Wrong arity or argument types for a function or builtin.
    #[error("{0}")]
    Argument(String),
    /// Function fell through without `return`, or the returned value
    /// cannot be cast to the declared return type.
    #[error("{0}")]
    ReturnType(String),
}

impl RuntimeError {
    /// Short kind name, used by dumps and diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Type(_) => "TypeError",
            Self::Name(_) => "NameError",
            Self::Index(_) => "IndexError",
            Self::Key(_) => "KeyError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Argument(_) => "ArgumentError",
            Self::ReturnType(_) => "ReturnTypeError",
        }
    }
}

/// Report an unrecoverable condition and abort the process.
///
/// There is no recovery path for allocation failure or invariant
/// violations mid-instruction.
pub fn fatal(msg: &str) -> ! {
    eprintln!("fatal error: {msg}");
    std::process::abort();
}
