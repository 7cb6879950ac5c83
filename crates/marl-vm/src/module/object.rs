// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The module object and its creation.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::loader::NativeHandle;
use super::namespace::{Namespace, StringTable};
use crate::error::Result;
use crate::gc::{GcRef, HeapObject};
use crate::gc::object::trace_values;
use crate::runtime::Value;
use crate::vm::Vm;

/// Name shown for the anonymous core module.
pub const BUILTIN_MODULE_NAME: &str = "<builtin>";

/// Initialization progress of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The body has not started; an initializer is pending
    Uninitialized,
    /// The body's fiber has been switched to and has not finished
    Running,
    /// Nothing left to run
    Initialized,
}

/// Code that must run once before a module is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initializer {
    /// Suspended fiber over the compiled top-level body
    Fiber(GcRef),
    /// Native entry point of a foreign module
    Entry(GcRef),
}

/// A named unit of code with its own variable namespace.
#[derive(Debug)]
pub struct Module {
    /// Registry key, `None` for the core module
    pub name: Option<Rc<str>>,
    /// Where the host found the module, for diagnostics only
    pub path: Option<Rc<str>>,
    /// Module variables
    pub namespace: Namespace,
    /// String literals referenced by the module's compiled code
    pub strings: StringTable,
    initializer: Option<Initializer>,
    /// Body fibers switched to and not yet finished, outermost first
    running: Vec<GcRef>,
    pub(crate) handle: Option<NativeHandle>,
}

impl Module {
    /// Creates an empty module with nothing to run.
    pub fn new(name: Option<Rc<str>>, path: Option<Rc<str>>) -> Self {
        Self {
            name,
            path,
            namespace: Namespace::new(),
            strings: StringTable::new(),
            initializer: None,
            running: Vec::new(),
            handle: None,
        }
    }

    /// Returns the module name, or the builtin label for the core module.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(BUILTIN_MODULE_NAME)
    }

    /// Returns the current run state.
    ///
    /// A module stays `Running` while any of its body fibers is unfinished,
    /// even if new code was installed in the meantime.
    pub fn state(&self) -> RunState {
        if !self.running.is_empty() {
            RunState::Running
        } else if self.initializer.is_some() {
            RunState::Uninitialized
        } else {
            RunState::Initialized
        }
    }

    /// Returns the pending initializer, if any.
    pub fn initializer(&self) -> Option<Initializer> {
        self.initializer
    }

    /// Returns the native library handle, if the module owns one.
    pub fn handle(&self) -> Option<NativeHandle> {
        self.handle
    }

    /// Installs code to run on the next `run`, replacing any pending code.
    pub(crate) fn set_initializer(&mut self, initializer: Initializer) {
        self.initializer = Some(initializer);
    }

    /// Takes the pending initializer and moves to the matching state.
    ///
    /// Handing off to a fiber leaves the module `Running` until that fiber
    /// finishes; an entry point is a direct call, so the module is
    /// `Initialized` immediately.
    pub(crate) fn start(&mut self) -> Option<Initializer> {
        let initializer = self.initializer.take()?;
        if let Initializer::Fiber(fiber) = initializer {
            self.running.push(fiber);
        }
        Some(initializer)
    }

    /// Marks the body running on `fiber` as done. Other bodies of this
    /// module still running keep it `Running`.
    pub(crate) fn finish(&mut self, fiber: GcRef) {
        self.running.retain(|running| *running != fiber);
    }

    pub(crate) fn trace(&self, gray: &mut Vec<GcRef>) {
        trace_values(self.namespace.values(), gray);
        match self.initializer {
            Some(Initializer::Fiber(object)) | Some(Initializer::Entry(object)) => gray.push(object),
            None => {}
        }
        gray.extend(self.running.iter().copied());
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "<module \"{}\" at \"{}\">", self.display_name(), path),
            None => write!(f, "<module \"{}\">", self.display_name()),
        }
    }
}

impl Vm {
    /// Allocates a module, registers it and seeds it from the core module.
    ///
    /// Registration happens before anything else touches the module, so a
    /// lookup of `name` from this point on finds it.
    pub(crate) fn create_module(&mut self, name: Rc<str>, path: Option<Rc<str>>) -> Result<GcRef> {
        let module = self.allocate(HeapObject::Module(Module::new(Some(Rc::clone(&name)), path)))?;
        self.modules.insert(Rc::clone(&name), module)?;

        let core = self.core_ref();
        let bindings: Vec<(Rc<str>, Value)> = self
            .heap
            .module(core)
            .namespace
            .iter()
            .map(|(name, value)| (Rc::clone(name), value.clone()))
            .collect();

        let namespace = &mut self.heap.module_mut(module).namespace;
        for (name, value) in &bindings {
            namespace.define(name, value.clone());
        }

        debug!("Created module {} with {} core bindings", name, bindings.len());
        Ok(module)
    }
}
