// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scoped protection for objects that are not yet linked to an owner.
//!
//! Multi-step construction (function, then closure, then fiber) leaves each
//! intermediate object reachable only from a Rust local until the next step
//! links it. Any allocation in between may collect, so the intermediate is
//! pushed on the heap's protection stack for exactly that window:
//!
//! ```rust,ignore
//! let closure = {
//!     let mut vm = vm.root(function);
//!     vm.allocate(HeapObject::Closure(Closure::new(function)))?
//! }; // `function` is unprotected again here, on every exit path
//! ```

use std::ops::{Deref, DerefMut};

use super::object::GcRef;
use crate::vm::Vm;

/// A VM borrow that keeps one object protected until dropped.
///
/// Dereferences to the VM so construction can continue through the guard.
/// Guards nest: rooting through a guard pushes another protection that is
/// released first.
pub struct Rooted<'vm> {
    vm: &'vm mut Vm,
    depth: usize,
}

impl Vm {
    /// Protects `object` from collection for the lifetime of the guard.
    pub fn root(&mut self, object: GcRef) -> Rooted<'_> {
        self.heap.push_root(object);
        let depth = self.heap.root_depth();
        Rooted { vm: self, depth }
    }
}

impl Deref for Rooted<'_> {
    type Target = Vm;

    fn deref(&self) -> &Vm {
        self.vm
    }
}

impl DerefMut for Rooted<'_> {
    fn deref_mut(&mut self) -> &mut Vm {
        self.vm
    }
}

impl Drop for Rooted<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.vm.heap.root_depth(),
            self.depth,
            "root guards released out of order"
        );
        self.vm.heap.pop_root();
    }
}
