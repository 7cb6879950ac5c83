// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The root module registry.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::gc::GcRef;

/// Maps module names to live module objects.
///
/// The registry is the single authority on whether a module exists. It is a
/// GC root: every registered module stays alive.
#[derive(Debug)]
pub struct ModuleRegistry {
    core: GcRef,
    named: FxHashMap<Rc<str>, GcRef>,
}

impl ModuleRegistry {
    /// Creates a registry holding only the core module.
    pub fn new(core: GcRef) -> Self {
        Self {
            core,
            named: FxHashMap::default(),
        }
    }

    /// Returns the core module.
    pub fn core(&self) -> GcRef {
        self.core
    }

    /// Finds a module. `None` names the core module.
    pub fn lookup(&self, name: Option<&str>) -> Option<GcRef> {
        match name {
            None => Some(self.core),
            Some(name) => self.named.get(name).copied(),
        }
    }

    /// Registers a module under `name`.
    ///
    /// Callers must have seen `lookup` miss for this name first.
    pub fn insert(&mut self, name: Rc<str>, module: GcRef) -> Result<()> {
        debug_assert!(
            !self.named.contains_key(&name),
            "module '{}' registered twice",
            name
        );
        self.named
            .try_reserve(1)
            .map_err(|_| Error::out_of_memory())?;
        self.named.insert(name, module);
        Ok(())
    }

    /// Unregisters a module that failed construction.
    pub(crate) fn remove(&mut self, name: &str) -> Option<GcRef> {
        self.named.remove(name)
    }

    /// Returns the number of named modules.
    pub fn len(&self) -> usize {
        self.named.len()
    }

    /// Returns true if no named module is registered.
    pub fn is_empty(&self) -> bool {
        self.named.is_empty()
    }

    /// Returns the names of the registered modules, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(|name| &**name)
    }

    /// Iterates over every registered module, core included.
    pub fn modules(&self) -> impl Iterator<Item = GcRef> + '_ {
        std::iter::once(self.core).chain(self.named.values().copied())
    }
}
