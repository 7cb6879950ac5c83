// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Slot heap with mark-and-sweep bookkeeping.
//!
//! The heap itself knows nothing about VM roots; the VM gathers them and
//! hands them to [`Heap::mark`]. Objects are addressed by [`GcRef`] slot
//! indices and freed slots are reused through a free list.

use super::object::{Color, GcRef, HeapObject, ObjectHeader};
use crate::config::Configuration;
use crate::module::Module;
use crate::runtime::{Closure, Fiber, ForeignClosure, Function};

/// A live object with its header.
#[derive(Debug)]
struct Slot {
    header: ObjectHeader,
    object: HeapObject,
}

/// Heap usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Number of live objects
    pub objects: usize,
    /// Bytes currently charged to live objects
    pub bytes_allocated: usize,
    /// Allocation level that triggers the next collection
    pub next_collection: usize,
    /// Number of completed collections
    pub collections: usize,
}

/// The object heap.
#[derive(Debug)]
pub struct Heap {
    /// Object storage; `None` marks a free slot
    slots: Vec<Option<Slot>>,
    /// Indices of free slots
    free: Vec<usize>,
    /// Transient protection stack for objects not yet linked to an owner
    roots: Vec<GcRef>,
    /// Bytes charged to live objects
    bytes_allocated: usize,
    /// Allocation level that triggers the next collection
    next_collection: usize,
    /// Minimum threshold growth after a collection
    minimum_growth: usize,
    /// Threshold growth relative to surviving bytes
    growth_percent: usize,
    /// Hard cap on allocated bytes
    limit: Option<usize>,
    /// Collect before every allocation
    stress: bool,
    /// Completed collections
    collections: usize,
}

impl Heap {
    /// Creates an empty heap using the configuration's heap settings.
    pub fn new(config: &Configuration) -> Self {
        Self {
            slots: Vec::with_capacity(256),
            free: Vec::new(),
            roots: Vec::with_capacity(8),
            bytes_allocated: 0,
            next_collection: config.initial_heap_size,
            minimum_growth: config.minimum_heap_growth,
            growth_percent: config.heap_growth_percent,
            limit: config.heap_limit,
            stress: config.stress_gc,
            collections: 0,
        }
    }

    /// Returns true if allocating `size` more bytes should collect first.
    pub fn needs_collection(&self, size: usize) -> bool {
        self.stress || self.bytes_allocated + size > self.next_collection
    }

    /// Returns true if allocating `size` more bytes would break the cap.
    pub fn exceeds_limit(&self, size: usize) -> bool {
        self.limit
            .is_some_and(|limit| self.bytes_allocated + size > limit)
    }

    /// Sets or clears the hard cap on allocated bytes.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Stores an object, reusing a free slot when one is available.
    pub fn insert(&mut self, object: HeapObject) -> GcRef {
        let size = object.size();
        let slot = Slot {
            header: ObjectHeader::new(size),
            object,
        };

        self.bytes_allocated += size;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                GcRef::new(index)
            }
            None => {
                self.slots.push(Some(slot));
                GcRef::new(self.slots.len() - 1)
            }
        }
    }

    /// Returns true if `object` refers to a live slot.
    pub fn contains(&self, object: GcRef) -> bool {
        matches!(self.slots.get(object.index()), Some(Some(_)))
    }

    /// Gets an object by reference.
    ///
    /// # Panics
    ///
    /// Panics on a reference to a freed slot, which means an object was
    /// reclaimed while something still pointed at it.
    pub fn get(&self, object: GcRef) -> &HeapObject {
        match self.slots.get(object.index()) {
            Some(Some(slot)) => &slot.object,
            _ => panic!("dangling heap reference {:?}", object),
        }
    }

    /// Gets an object mutably by reference.
    ///
    /// # Panics
    ///
    /// Panics on a reference to a freed slot.
    pub fn get_mut(&mut self, object: GcRef) -> &mut HeapObject {
        match self.slots.get_mut(object.index()) {
            Some(Some(slot)) => &mut slot.object,
            _ => panic!("dangling heap reference {:?}", object),
        }
    }

    /// Returns the module behind `object`, if it is one.
    pub fn as_module(&self, object: GcRef) -> Option<&Module> {
        match self.get(object) {
            HeapObject::Module(module) => Some(module),
            _ => None,
        }
    }

    /// Returns the module behind `object` mutably, if it is one.
    pub fn as_module_mut(&mut self, object: GcRef) -> Option<&mut Module> {
        match self.get_mut(object) {
            HeapObject::Module(module) => Some(module),
            _ => None,
        }
    }

    /// Returns the foreign closure behind `object`, if it is one.
    pub fn as_foreign(&self, object: GcRef) -> Option<&ForeignClosure> {
        match self.get(object) {
            HeapObject::Foreign(foreign) => Some(foreign),
            _ => None,
        }
    }

    /// Returns the module behind a reference known to be a module.
    pub fn module(&self, object: GcRef) -> &Module {
        match self.get(object) {
            HeapObject::Module(module) => module,
            other => panic!("expected a module at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Mutable variant of [`Heap::module`].
    pub fn module_mut(&mut self, object: GcRef) -> &mut Module {
        match self.get_mut(object) {
            HeapObject::Module(module) => module,
            other => panic!("expected a module at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Returns the function behind a reference known to be a function.
    pub fn function(&self, object: GcRef) -> &Function {
        match self.get(object) {
            HeapObject::Function(function) => function,
            other => panic!("expected a function at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Returns the closure behind a reference known to be a closure.
    pub fn closure(&self, object: GcRef) -> &Closure {
        match self.get(object) {
            HeapObject::Closure(closure) => closure,
            other => panic!("expected a closure at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Returns the native callable behind a reference known to be one.
    pub fn foreign(&self, object: GcRef) -> &ForeignClosure {
        match self.get(object) {
            HeapObject::Foreign(foreign) => foreign,
            other => panic!("expected a foreign function at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Returns the fiber behind a reference known to be a fiber.
    pub fn fiber(&self, object: GcRef) -> &Fiber {
        match self.get(object) {
            HeapObject::Fiber(fiber) => fiber,
            other => panic!("expected a fiber at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Mutable variant of [`Heap::fiber`].
    pub fn fiber_mut(&mut self, object: GcRef) -> &mut Fiber {
        match self.get_mut(object) {
            HeapObject::Fiber(fiber) => fiber,
            other => panic!("expected a fiber at {:?}, found {}", object, other.type_name()),
        }
    }

    /// Protects an object from collection until the matching pop.
    pub fn push_root(&mut self, object: GcRef) {
        self.roots.push(object);
    }

    /// Removes the most recent protection.
    pub fn pop_root(&mut self) {
        let popped = self.roots.pop();
        debug_assert!(popped.is_some(), "root stack underflow");
    }

    /// Returns the depth of the protection stack.
    pub fn root_depth(&self) -> usize {
        self.roots.len()
    }

    /// Marks everything reachable from `gray` and the protection stack.
    pub fn mark(&mut self, mut gray: Vec<GcRef>) {
        gray.extend(self.roots.iter().copied());

        while let Some(object) = gray.pop() {
            let Some(Some(slot)) = self.slots.get_mut(object.index()) else {
                continue;
            };
            if slot.header.is_marked() {
                continue;
            }

            slot.header.color = Color::Black;
            slot.object.trace(&mut gray);
        }
    }

    /// Frees every unmarked object, clears marks on the survivors and
    /// recomputes the collection threshold. Returns the freed objects so the
    /// caller can release resources they own.
    pub fn sweep(&mut self) -> Vec<HeapObject> {
        let mut dead = Vec::new();

        for index in 0..self.slots.len() {
            let live = match &mut self.slots[index] {
                Some(slot) if slot.header.is_marked() => {
                    slot.header.color = Color::White;
                    true
                }
                Some(_) => false,
                None => continue,
            };

            if !live {
                if let Some(slot) = self.slots[index].take() {
                    self.bytes_allocated -= slot.header.size;
                    self.free.push(index);
                    dead.push(slot.object);
                }
            }
        }

        let growth = (self.bytes_allocated * self.growth_percent / 100).max(self.minimum_growth);
        self.next_collection = self.bytes_allocated + growth;
        self.collections += 1;
        dead
    }

    /// Removes and returns every live object.
    pub fn drain(&mut self) -> Vec<HeapObject> {
        self.free.clear();
        self.roots.clear();
        self.bytes_allocated = 0;
        self.slots
            .drain(..)
            .flatten()
            .map(|slot| slot.object)
            .collect()
    }

    /// Returns the current usage counters.
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            objects: self.slots.len() - self.free.len(),
            bytes_allocated: self.bytes_allocated,
            next_collection: self.next_collection,
            collections: self.collections,
        }
    }
}
