// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiled functions, closures and native callables.

use std::fmt;
use std::rc::Rc;

use super::value::Value;
use crate::compiler::Bytecode;
use crate::error::Result;
use crate::gc::GcRef;
use crate::vm::Vm;

/// A compiled function body.
///
/// Functions are compiled against a module: variable operands index that
/// module's namespace and string operands index its string cache.
#[derive(Debug, Clone)]
pub struct Function {
    /// The function name
    pub name: Rc<str>,
    /// The module whose namespace this code reads and writes
    pub module: GcRef,
    /// The compiled bytecode
    pub bytecode: Bytecode,
}

impl Function {
    /// Creates a new function.
    pub fn new(name: Rc<str>, module: GcRef, bytecode: Bytecode) -> Self {
        Self {
            name,
            module,
            bytecode,
        }
    }
}

/// A closure over a compiled function.
#[derive(Debug, Clone, Copy)]
pub struct Closure {
    /// The wrapped function
    pub function: GcRef,
}

impl Closure {
    /// Creates a new closure.
    pub fn new(function: GcRef) -> Self {
        Self { function }
    }
}

/// A native (Rust) function.
///
/// Receives the VM and the call arguments. Module entry points receive the
/// module itself as their only argument.
pub type ForeignFunction = fn(&mut Vm, &[Value]) -> Result<Value>;

/// A native callable owned by a module.
#[derive(Clone)]
pub struct ForeignClosure {
    /// The function name
    pub name: Rc<str>,
    /// The arity (-1 for variadic)
    pub arity: i32,
    /// The native function pointer
    pub function: ForeignFunction,
    /// The module the function was created for
    pub module: GcRef,
}

impl ForeignClosure {
    /// Creates a new foreign closure.
    pub fn new(name: Rc<str>, arity: i32, function: ForeignFunction, module: GcRef) -> Self {
        Self {
            name,
            arity,
            function,
            module,
        }
    }

    /// Returns true if the closure accepts `count` arguments.
    pub fn accepts(&self, count: usize) -> bool {
        self.arity < 0 || self.arity as usize == count
    }
}

impl fmt::Debug for ForeignClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignClosure({}/{})", self.name, self.arity)
    }
}
