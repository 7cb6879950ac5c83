// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host-driven module loading.
//!
//! The VM never resolves module names itself. It asks the host's
//! [`ModuleLoader`], classifies the answer into the runtime's error
//! taxonomy, and builds the module from source text or a native entry
//! point.

use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::object::{Initializer, Module};
use crate::compiler::Compiler;
use crate::error::{Error, Result};
use crate::gc::{GcRef, HeapObject};
use crate::runtime::{Closure, Fiber, ForeignClosure, ForeignFunction, Function, Value};
use crate::vm::Vm;

/// Symbol every foreign module library exports as its entry point.
pub const MODULE_ENTRY_NAME: &str = "MarlModuleInit";

/// Opaque handle to a native library opened by the host.
///
/// The VM never interprets the value. It hands it back to
/// [`ModuleLoader::unload_foreign_module`] exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// Wraps a host handle value.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the host handle value.
    pub fn into_raw(self) -> usize {
        self.0
    }
}

/// The host's answer to a module lookup.
#[derive(Debug, Clone)]
pub enum LoadModuleResult {
    /// Source text to compile into the module
    Source {
        /// Module source
        text: String,
        /// Where the source came from
        path: Option<String>,
    },
    /// A native module
    Foreign {
        /// Library to release when the module goes away
        handle: Option<NativeHandle>,
        /// The library's entry point
        entry: ForeignFunction,
        /// Where the library came from
        path: Option<String>,
    },
    /// No module by that name
    NotFound,
    /// The host ran out of memory; any error it raised is reported instead
    OutOfMemory,
    /// The host cannot load modules of this kind
    NotSupported,
    /// Host failure with a fixed message
    StaticError(&'static str),
    /// Host failure with a formatted message
    OwnedError(String),
}

impl LoadModuleResult {
    /// Source text without a path.
    pub fn source(text: impl Into<String>) -> Self {
        LoadModuleResult::Source {
            text: text.into(),
            path: None,
        }
    }

    /// Source text found at `path`.
    pub fn source_at(text: impl Into<String>, path: impl Into<String>) -> Self {
        LoadModuleResult::Source {
            text: text.into(),
            path: Some(path.into()),
        }
    }
}

/// What a loader may touch while answering a lookup.
pub struct LoadContext<'a> {
    pending_error: &'a mut Option<Error>,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(pending_error: &'a mut Option<Error>) -> Self {
        Self { pending_error }
    }

    /// Records a specific error to report if the loader then answers
    /// [`LoadModuleResult::OutOfMemory`].
    pub fn raise(&mut self, error: Error) {
        *self.pending_error = Some(error);
    }

    /// Returns the error already pending, if any.
    pub fn pending_error(&self) -> Option<&Error> {
        self.pending_error.as_ref()
    }
}

/// Host callbacks for module resolution.
pub trait ModuleLoader {
    /// Resolves `name` into source text or a native module.
    fn load_module(&mut self, name: &str, cx: &mut LoadContext<'_>) -> LoadModuleResult;

    /// Releases a library handle previously returned from
    /// [`ModuleLoader::load_module`].
    fn unload_foreign_module(&mut self, handle: NativeHandle) {
        let _ = handle;
    }
}

impl Vm {
    /// Finds or loads the module called `name`.
    ///
    /// An existing module is returned as is, without asking the host. A
    /// failed load leaves nothing registered, so the next call asks again.
    pub fn load_module(&mut self, name: &str) -> Result<Value> {
        // Only an error raised during this lookup may be reported for it
        self.pending_error = None;

        if let Some(module) = self.modules.lookup(Some(name)) {
            trace!("Module {} already loaded", name);
            return Ok(Value::Object(module));
        }

        let Some(loader) = self.config.loader.as_mut() else {
            return Err(Error::import("Module load not supported"));
        };

        debug!("Asking host for module {}", name);
        let answer = {
            let mut cx = LoadContext::new(&mut self.pending_error);
            loader.load_module(name, &mut cx)
        };
        let pending = self.pending_error.take();

        let module = match answer {
            LoadModuleResult::Source { text, path } => {
                self.load_source(Rc::from(name), path.map(Rc::from), &text)?
            }
            LoadModuleResult::Foreign {
                handle,
                entry,
                path,
            } => match self.load_foreign(Rc::from(name), path.map(Rc::from), handle, entry) {
                Ok(module) => module,
                Err(error) => {
                    if let Some(handle) = handle {
                        warn!("Unloading library for module {} after failed load", name);
                        if let Some(loader) = self.config.loader.as_mut() {
                            loader.unload_foreign_module(handle);
                        }
                    }
                    return Err(error);
                }
            },
            LoadModuleResult::NotFound => return Err(Error::import("Module not found")),
            LoadModuleResult::OutOfMemory => return Err(pending.unwrap_or_else(Error::out_of_memory)),
            LoadModuleResult::NotSupported => {
                return Err(Error::import("Module loading not supported"));
            }
            LoadModuleResult::StaticError(message) => return Err(Error::import(message)),
            LoadModuleResult::OwnedError(message) => return Err(Error::Import(message)),
        };

        Ok(Value::Object(module))
    }

    /// Compiles `source` into the module called `name` and prepares its body
    /// to run.
    ///
    /// An existing module is reused, which is how code is fed into one
    /// module piece by piece. A module created here is unregistered again if
    /// construction fails.
    pub(crate) fn load_source(
        &mut self,
        name: Rc<str>,
        path: Option<Rc<str>>,
        source: &str,
    ) -> Result<GcRef> {
        let (module, created) = match self.modules.lookup(Some(&name)) {
            Some(module) => (module, false),
            None => (self.create_module(Rc::clone(&name), path)?, true),
        };

        if let Err(error) = self.prepare_body(module, &name, source) {
            if created {
                self.modules.remove(&name);
            }
            return Err(error);
        }

        debug!("Compiled module {}", name);
        Ok(module)
    }

    /// Builds function, closure and fiber for the module body.
    fn prepare_body(&mut self, module: GcRef, name: &Rc<str>, source: &str) -> Result<()> {
        let bytecode = Compiler::new(self.heap.module_mut(module))
            .compile(source)
            .map_err(|error| Error::Compile(format!("Module compile error: {}: {}", name, error)))?;

        let function = self.allocate(HeapObject::Function(Function::new(
            Rc::clone(name),
            module,
            bytecode,
        )))?;

        let closure = {
            let mut vm = self.root(function);
            vm.allocate(HeapObject::Closure(Closure::new(function)))?
        };

        let fiber = {
            let mut vm = self.root(closure);
            vm.allocate(HeapObject::Fiber(Fiber::new(closure, function, Some(module))))?
        };

        self.heap
            .module_mut(module)
            .set_initializer(Initializer::Fiber(fiber));
        Ok(())
    }

    /// Creates a foreign module whose body is the native `entry` point.
    ///
    /// The handle is attached only once the module is complete. Releasing it
    /// after a failure is left to the caller.
    pub(crate) fn load_foreign(
        &mut self,
        name: Rc<str>,
        path: Option<Rc<str>>,
        handle: Option<NativeHandle>,
        entry: ForeignFunction,
    ) -> Result<GcRef> {
        debug_assert!(
            self.modules.lookup(Some(&name)).is_none(),
            "foreign module '{}' loaded twice",
            name
        );

        let module = self.create_module(Rc::clone(&name), path)?;
        let closure = ForeignClosure::new(Rc::from(MODULE_ENTRY_NAME), 1, entry, module);
        let closure = match self.allocate(HeapObject::Foreign(closure)) {
            Ok(closure) => closure,
            Err(error) => {
                self.modules.remove(&name);
                return Err(error);
            }
        };

        let module_object: &mut Module = self.heap.module_mut(module);
        module_object.set_initializer(Initializer::Entry(closure));
        module_object.handle = handle;

        debug!("Created foreign module {}", name);
        Ok(module)
    }
}
