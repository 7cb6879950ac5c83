// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fiber execution loop.

use std::rc::Rc;

use tracing::debug;

use super::Vm;
use crate::compiler::{OpCode, Operand};
use crate::error::{Error, Result};
use crate::gc::GcRef;
use crate::module::primitives::Flow;
use crate::runtime::Value;

impl Vm {
    /// Runs the current fiber, following switches between fibers, until a
    /// fiber with no caller finishes. Returns that fiber's result.
    ///
    /// On error every fiber in the current chain is abandoned and the VM is
    /// left with no current fiber.
    pub(crate) fn execute(&mut self) -> Result<Value> {
        let result = self.run_loop();
        if let Err(error) = &result {
            self.abandon(error);
        }
        result
    }

    fn run_loop(&mut self) -> Result<Value> {
        loop {
            let Some(fiber) = self.fiber else {
                return Ok(Value::Null);
            };

            let Some(frame) = self.heap.fiber(fiber).frames.last().cloned() else {
                if let Some(result) = self.return_from_frame(fiber, Value::Null) {
                    return Ok(result);
                }
                continue;
            };

            let code = self.heap.function(frame.function);
            let module = code.module;
            let Some(instruction) = code.bytecode.instructions.get(frame.ip).cloned() else {
                // Running off the end returns null
                if let Some(result) = self.return_from_frame(fiber, Value::Null) {
                    return Ok(result);
                }
                continue;
            };

            if let Some(frame) = self.heap.fiber_mut(fiber).frames.last_mut() {
                frame.ip += 1;
            }

            match instruction.opcode {
                OpCode::LoadConst => {
                    if let Some(Operand::Constant(index)) = instruction.operand {
                        let value = self
                            .heap
                            .function(frame.function)
                            .bytecode
                            .constants
                            .get(index as usize)
                            .cloned()
                            .unwrap_or_default();
                        self.push(fiber, value);
                    }
                }

                OpCode::LoadString => {
                    if let Some(Operand::String(index)) = instruction.operand {
                        let value = self
                            .heap
                            .module(module)
                            .strings
                            .get(index)
                            .map(|s| Value::Str(Rc::clone(s)))
                            .unwrap_or_default();
                        self.push(fiber, value);
                    }
                }

                OpCode::LoadNull => self.push(fiber, Value::Null),
                OpCode::LoadTrue => self.push(fiber, Value::Bool(true)),
                OpCode::LoadFalse => self.push(fiber, Value::Bool(false)),

                OpCode::Pop => {
                    self.pop(fiber);
                }

                OpCode::Dup => {
                    let value = self.heap.fiber(fiber).peek(0);
                    self.push(fiber, value);
                }

                OpCode::LoadVariable => {
                    if let Some(Operand::Variable(slot)) = instruction.operand {
                        let value = self
                            .heap
                            .module(module)
                            .namespace
                            .get(slot as usize)
                            .cloned()
                            .unwrap_or_default();
                        self.push(fiber, value);
                    }
                }

                OpCode::StoreVariable => {
                    if let Some(Operand::Variable(slot)) = instruction.operand {
                        let value = self.heap.fiber(fiber).peek(0);
                        self.heap.module_mut(module).namespace.set(slot as usize, value);
                    }
                }

                OpCode::Add => self.binary_add(fiber)?,

                OpCode::Call => {
                    if let Some(Operand::ArgCount(count)) = instruction.operand {
                        let count = count as usize;
                        let (callee, args) = {
                            let stack = &self.heap.fiber(fiber).stack;
                            let start = stack.len().saturating_sub(count);
                            (self.heap.fiber(fiber).peek(count), stack[start..].to_vec())
                        };

                        // Arguments stay on the stack, and so stay rooted, during the call
                        let result = self.call_value(&callee, &args)?;

                        let stack = &mut self.heap.fiber_mut(fiber).stack;
                        stack.truncate(stack.len().saturating_sub(count + 1));
                        stack.push(result);
                    }
                }

                OpCode::Invoke => {
                    if let Some(Operand::Method { name, args }) = instruction.operand {
                        let count = args as usize;
                        let method = self
                            .heap
                            .module(module)
                            .strings
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| Rc::from(""));

                        let (receiver, arguments) = {
                            let target = self.heap.fiber_mut(fiber);
                            let start = target.stack.len().saturating_sub(count);
                            let arguments: Vec<Value> = target.stack.drain(start..).collect();
                            (target.pop(), arguments)
                        };

                        let (target, primitive) = self.resolve_method(&receiver, &method, count)?;
                        match primitive(self, target, &arguments)? {
                            Flow::Return(value) => self.push(fiber, value),
                            // The result arrives on this fiber's stack when the
                            // switched-to fiber returns
                            Flow::Switch => {}
                        }
                    }
                }

                OpCode::Import => {
                    let name = self.pop(fiber);
                    let Some(name) = name.as_str() else {
                        return Err(Error::type_error("Expected a string"));
                    };
                    let loaded = self.load_module(name)?;
                    self.push(fiber, loaded);
                }

                OpCode::Raise => {
                    let value = self.pop(fiber);
                    return Err(Error::Raised(self.stringify(&value)));
                }

                OpCode::Return => {
                    let value = self.pop(fiber);
                    if let Some(result) = self.return_from_frame(fiber, value) {
                        return Ok(result);
                    }
                }
            }
        }
    }

    /// Pops the innermost frame of `fiber`. When the fiber has no frames
    /// left its body is finished in its module and control goes back to its
    /// caller, which receives `value`. Returns `value` if there is no caller.
    fn return_from_frame(&mut self, fiber: GcRef, value: Value) -> Option<Value> {
        let finished = self.heap.fiber_mut(fiber);
        if let Some(frame) = finished.frames.pop() {
            finished.stack.truncate(frame.base);
        }
        if !finished.frames.is_empty() {
            finished.push(value);
            return None;
        }

        let caller = finished.caller.take();
        let module = finished.module;
        if let Some(module) = module {
            let module = self.heap.module_mut(module);
            module.finish(fiber);
            debug!("Module {} initialized", module.display_name());
        }

        match caller {
            Some(caller) => {
                self.fiber = Some(caller);
                self.push(caller, value);
                None
            }
            None => {
                self.fiber = None;
                Some(value)
            }
        }
    }

    /// Marks every fiber from the current one up its caller chain as failed.
    fn abandon(&mut self, error: &Error) {
        let mut next = self.fiber.take();

        while let Some(object) = next {
            let fiber = self.heap.fiber_mut(object);
            fiber.error = Some(error.clone());
            fiber.frames.clear();
            fiber.stack.clear();
            next = fiber.caller.take();
            let module = fiber.module;

            // A failed body never runs again
            if let Some(module) = module {
                self.heap.module_mut(module).finish(object);
            }
        }
    }

    fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value> {
        let foreign = callee
            .as_object()
            .and_then(|object| self.heap.as_foreign(object));
        let Some(foreign) = foreign else {
            return Err(Error::type_error(format!(
                "'{}' is not callable",
                self.type_name(callee)
            )));
        };

        if !foreign.accepts(args.len()) {
            return Err(Error::type_error(format!(
                "Function '{}' expects {} arguments, got {}",
                foreign.name,
                foreign.arity,
                args.len()
            )));
        }

        let function = foreign.function;
        function(self, args)
    }

    fn binary_add(&mut self, fiber: GcRef) -> Result<()> {
        let b = self.pop(fiber);
        let a = self.pop(fiber);

        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x
                .checked_add(*y)
                .map(Value::Int)
                .ok_or_else(|| Error::Raised("Integer overflow".to_string()))?,
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Value::from(format!("{}{}", self.stringify(&a), self.stringify(&b)))
            }
            _ => {
                return Err(Error::type_error(format!(
                    "Cannot add '{}' and '{}'",
                    self.type_name(&a),
                    self.type_name(&b)
                )));
            }
        };

        self.push(fiber, result);
        Ok(())
    }

    fn push(&mut self, fiber: GcRef, value: Value) {
        self.heap.fiber_mut(fiber).push(value);
    }

    fn pop(&mut self, fiber: GcRef) -> Value {
        self.heap.fiber_mut(fiber).pop()
    }
}
