// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! GC object representation.

use crate::compiler::Instruction;
use crate::module::Module;
use crate::runtime::{Closure, Fiber, ForeignClosure, Function, Value};

/// Mark state of an object during a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// Not yet reached
    #[default]
    White,
    /// Reached and traced
    Black,
}

/// Object header for GC metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectHeader {
    /// Mark state
    pub color: Color,
    /// Accounted size in bytes
    pub size: usize,
}

impl ObjectHeader {
    /// Creates a new, unmarked header.
    pub fn new(size: usize) -> Self {
        Self {
            color: Color::White,
            size,
        }
    }

    /// Checks if the object was reached during the current mark phase.
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.color == Color::Black
    }
}

/// A reference to a garbage-collected object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef {
    index: u32,
}

impl GcRef {
    /// Creates a reference to the given heap slot.
    #[inline]
    pub fn new(index: usize) -> Self {
        Self {
            index: index as u32,
        }
    }

    /// Returns the slot index of this reference.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Debug for GcRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcRef({})", self.index)
    }
}

/// Every object kind the heap can hold.
#[derive(Debug)]
pub enum HeapObject {
    /// A module
    Module(Module),
    /// A compiled function body
    Function(Function),
    /// A closure over a function
    Closure(Closure),
    /// A native callable
    Foreign(ForeignClosure),
    /// An execution context
    Fiber(Fiber),
}

/// Bytes charged for every object regardless of its contents.
pub const OBJECT_OVERHEAD: usize = std::mem::size_of::<ObjectHeader>() + std::mem::size_of::<HeapObject>();

impl HeapObject {
    /// Returns the type name shown to scripts.
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapObject::Module(_) => "module",
            HeapObject::Function(_) | HeapObject::Closure(_) | HeapObject::Foreign(_) => "function",
            HeapObject::Fiber(_) => "fiber",
        }
    }

    /// Returns the number of bytes charged for this object at allocation.
    pub fn size(&self) -> usize {
        let payload = match self {
            HeapObject::Function(function) => {
                function.bytecode.instructions.len() * std::mem::size_of::<Instruction>()
                    + function.bytecode.constants.len() * std::mem::size_of::<Value>()
            }
            HeapObject::Fiber(fiber) => fiber.stack.capacity() * std::mem::size_of::<Value>(),
            HeapObject::Module(_) | HeapObject::Closure(_) | HeapObject::Foreign(_) => 0,
        };
        OBJECT_OVERHEAD + payload
    }

    /// Pushes every object directly referenced by this one onto `gray`.
    pub fn trace(&self, gray: &mut Vec<GcRef>) {
        match self {
            HeapObject::Module(module) => module.trace(gray),
            HeapObject::Function(function) => gray.push(function.module),
            HeapObject::Closure(closure) => gray.push(closure.function),
            HeapObject::Foreign(foreign) => gray.push(foreign.module),
            HeapObject::Fiber(fiber) => {
                for frame in &fiber.frames {
                    gray.push(frame.closure);
                    gray.push(frame.function);
                }
                trace_values(&fiber.stack, gray);
                gray.extend(fiber.caller);
                gray.extend(fiber.module);
            }
        }
    }
}

/// Pushes the heap references found in `values` onto `gray`.
pub(crate) fn trace_values<'a>(values: impl IntoIterator<Item = &'a Value>, gray: &mut Vec<GcRef>) {
    gray.extend(values.into_iter().filter_map(Value::as_object));
}
