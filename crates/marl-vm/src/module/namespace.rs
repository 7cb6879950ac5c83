// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module namespaces and literal caches.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::runtime::Value;

/// An insertion-ordered variable table.
///
/// Bindings are never removed. Compiled code addresses variables by slot
/// index, so a slot keeps its position for the life of the namespace.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    names: Vec<Rc<str>>,
    values: Vec<Value>,
    index: FxHashMap<Rc<str>, usize>,
}

impl Namespace {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines `name`, overwriting the value if it already exists.
    /// Returns the slot index.
    pub fn define(&mut self, name: &str, value: Value) -> usize {
        match self.index.get(name) {
            Some(&slot) => {
                self.values[slot] = value;
                slot
            }
            None => self.append(name, value),
        }
    }

    /// Returns the slot for `name`, creating a null binding if it is new.
    /// Existing values are left untouched.
    pub fn declare(&mut self, name: &str) -> usize {
        match self.index.get(name) {
            Some(&slot) => slot,
            None => self.append(name, Value::Null),
        }
    }

    fn append(&mut self, name: &str, value: Value) -> usize {
        let name: Rc<str> = Rc::from(name);
        let slot = self.names.len();
        self.names.push(Rc::clone(&name));
        self.values.push(value);
        self.index.insert(name, slot);
        slot
    }

    /// Returns the slot index of `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the value in `slot`.
    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot)
    }

    /// Returns the value bound to `name`.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.find(name).and_then(|slot| self.get(slot))
    }

    /// Overwrites the value in an existing slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot` was never defined.
    pub fn set(&mut self, slot: usize, value: Value) {
        self.values[slot] = value;
    }

    /// Returns the number of bindings.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates over names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.names.iter()
    }

    /// Iterates over values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Iterates over bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.names.iter().zip(self.values.iter())
    }
}

/// Deduplicating storage for the string literals of a module's code.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    strings: Vec<Rc<str>>,
    index: FxHashMap<Rc<str>, u32>,
}

impl StringTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `s`, adding it on first use.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.index.get(s) {
            return index;
        }

        let index = self.strings.len() as u32;
        let s: Rc<str> = Rc::from(s);
        self.strings.push(Rc::clone(&s));
        self.index.insert(s, index);
        index
    }

    /// Returns the string at `index`.
    pub fn get(&self, index: u32) -> Option<&Rc<str>> {
        self.strings.get(index as usize)
    }

    /// Returns the number of distinct strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Iterates over the strings in first-use order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(|s| &**s)
    }
}
