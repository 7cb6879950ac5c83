// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fibers: independent call stacks the VM switches between.

use super::value::Value;
use crate::error::Error;
use crate::gc::GcRef;

/// A call frame inside a fiber.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The closure being executed
    pub closure: GcRef,
    /// The closure's function, cached to avoid a second heap hop
    pub function: GcRef,
    /// Instruction pointer within the function
    pub ip: usize,
    /// Base index in the fiber stack for this frame
    pub base: usize,
}

impl Frame {
    /// Creates a new frame at the first instruction.
    pub fn new(closure: GcRef, function: GcRef, base: usize) -> Self {
        Self {
            closure,
            function,
            ip: 0,
            base,
        }
    }
}

/// A suspended or running execution context.
///
/// A fiber owns its own value stack and frames, so switching to another
/// fiber never grows the caller's stack. When the last frame returns,
/// control goes back to `caller`.
#[derive(Debug, Clone, Default)]
pub struct Fiber {
    /// Active call frames, innermost last
    pub frames: Vec<Frame>,
    /// Value stack shared by all frames of this fiber
    pub stack: Vec<Value>,
    /// The fiber to resume when this one finishes
    pub caller: Option<GcRef>,
    /// Error that aborted this fiber, if any
    pub error: Option<Error>,
    /// The module whose top-level code this fiber runs
    pub module: Option<GcRef>,
}

impl Fiber {
    /// Creates a fiber prepared to run `closure` from its first instruction.
    pub fn new(closure: GcRef, function: GcRef, module: Option<GcRef>) -> Self {
        Self {
            frames: vec![Frame::new(closure, function, 0)],
            stack: Vec::with_capacity(16),
            caller: None,
            error: None,
            module,
        }
    }

    /// Returns true if the fiber can be switched to: it still has frames to
    /// run and has not been aborted by an error.
    pub fn is_runnable(&self) -> bool {
        !self.frames.is_empty() && self.error.is_none()
    }

    /// Returns true once every frame has returned.
    pub fn is_done(&self) -> bool {
        self.frames.is_empty()
    }

    /// Pushes a value onto the stack.
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops a value, returning null on an empty stack.
    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or_default()
    }

    /// Returns the value `distance` slots below the top.
    pub fn peek(&self, distance: usize) -> Value {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|index| self.stack.get(index))
            .cloned()
            .unwrap_or_default()
    }
}
