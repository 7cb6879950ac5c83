// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script value representation.

use std::rc::Rc;

use crate::gc::GcRef;

/// A script value.
///
/// Immediate values live inline; everything with identity (modules,
/// functions, fibers) lives on the VM heap and is referenced by [`GcRef`].
/// Strings are reference counted and immutable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// null
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Immutable string
    Str(Rc<str>),
    /// Heap object reference
    Object(GcRef),
}

impl Value {
    /// Creates a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the heap reference, if this is an object.
    pub fn as_object(&self) -> Option<GcRef> {
        match self {
            Value::Object(object) => Some(*object),
            _ => None,
        }
    }

    /// Converts the value to a boolean.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Returns the type name of an immediate value, or `None` for objects
    /// (whose type lives on the heap).
    pub fn immediate_type(&self) -> Option<&'static str> {
        match self {
            Value::Null => Some("null"),
            Value::Bool(_) => Some("bool"),
            Value::Int(_) => Some("int"),
            Value::Str(_) => Some("string"),
            Value::Object(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}
