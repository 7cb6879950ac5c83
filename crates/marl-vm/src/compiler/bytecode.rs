// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.

use crate::runtime::value::Value;

/// A compiled bytecode chunk.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// The constant pool (integers; string literals live in the module)
    pub constants: Vec<Value>,
}

impl Bytecode {
    /// Creates a new empty bytecode chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Adds a constant and returns its index, or `None` when the pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        if let Some(index) = self.constants.iter().position(|c| *c == value) {
            return Some(index as u16);
        }

        let index = u16::try_from(self.constants.len()).ok()?;
        self.constants.push(value);
        Some(index)
    }
}

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Optional operand
    pub operand: Option<Operand>,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }
}

/// Instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Constant pool index
    Constant(u16),
    /// Index into the owning module's string cache
    String(u32),
    /// Index into the owning module's namespace
    Variable(u16),
    /// Number of arguments
    ArgCount(u8),
    /// Method call: name in the module string cache plus argument count
    Method {
        /// String cache index of the method name
        name: u32,
        /// Number of arguments, not counting the receiver
        args: u8,
    },
}

/// Operation codes for the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Stack operations
    /// Push a constant onto the stack
    LoadConst,
    /// Push a string literal from the module string cache
    LoadString,
    /// Push null
    LoadNull,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Pop the top value
    Pop,
    /// Duplicate the top value
    Dup,

    // Variable operations
    /// Load a module variable
    LoadVariable,
    /// Store the top value to a module variable, leaving it on the stack
    StoreVariable,

    // Arithmetic
    /// Add integers or concatenate strings
    Add,

    // Calls
    /// Call a foreign function
    Call,
    /// Invoke a primitive method on the receiver
    Invoke,
    /// Return from the current frame
    Return,

    // Modules and errors
    /// Pop a module name, push the loaded module
    Import,
    /// Pop a value and raise it as an error
    Raise,
}
