// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode compiler for module source text.
//!
//! Compilation always happens against a target module: identifiers resolve
//! to slots in that module's namespace and string literals are interned in
//! its string cache.
//!
//! # Module Structure
//!
//! - `bytecode`: Bytecode definitions and instructions
//! - `lexer`: Source tokenizer
//! - `codegen`: Single-pass code generation from tokens

pub mod bytecode;
pub mod codegen;
pub mod lexer;

pub use bytecode::{Bytecode, Instruction, OpCode, Operand};
pub use codegen::Compiler;

/// A compile failure with the line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct CompileError {
    /// 1-based line number
    pub line: u32,
    /// Human-readable description
    pub message: String,
}

impl CompileError {
    /// Creates a new compile error.
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}
