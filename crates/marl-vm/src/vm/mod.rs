// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - Fiber execution loop
//! - `builtins` - Native functions installed in the core module

mod builtins;
mod interpreter;

use std::io::Write;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::gc::{GcRef, Heap, HeapObject, HeapStats};
use crate::module::primitives::{self, Flow, Primitive};
use crate::module::{Module, ModuleRegistry, RunState};
use crate::runtime::{ForeignClosure, ForeignFunction, Value};

/// A virtual machine instance.
///
/// Each VM owns its heap, its module registry and its configuration. It is
/// single-threaded; run separate VMs for parallel work.
pub struct Vm {
    /// Object storage
    pub(crate) heap: Heap,
    /// Live modules by name
    pub(crate) modules: ModuleRegistry,
    /// The fiber being executed, if any
    pub(crate) fiber: Option<GcRef>,
    /// Host configuration
    pub(crate) config: Configuration,
    /// Error a loader raised before answering
    pub(crate) pending_error: Option<Error>,
}

impl Vm {
    /// Creates a VM with an empty registry and a freshly seeded core module.
    pub fn new(config: Configuration) -> Self {
        let mut heap = Heap::new(&config);
        let core = heap.insert(HeapObject::Module(Module::new(None, None)));

        let mut vm = Self {
            heap,
            modules: ModuleRegistry::new(core),
            fiber: None,
            config,
            pending_error: None,
        };
        builtins::install(&mut vm);

        debug!(
            "VM ready with {} core bindings",
            vm.heap.module(core).namespace.len()
        );
        vm
    }

    pub(crate) fn core_ref(&self) -> GcRef {
        self.modules.core()
    }

    /// Returns the core module.
    pub fn core_module(&self) -> Value {
        Value::Object(self.core_ref())
    }

    /// Stores a new object, collecting first if the heap has grown enough.
    ///
    /// The object itself is not a root during that collection: anything it
    /// references must already be reachable or rooted.
    pub(crate) fn allocate(&mut self, object: HeapObject) -> Result<GcRef> {
        let size = object.size();
        if self.heap.needs_collection(size) {
            self.collect_garbage();
        }
        if self.heap.exceeds_limit(size) {
            debug!("Allocation of {} bytes refused by heap limit", size);
            return Err(Error::out_of_memory());
        }
        Ok(self.heap.insert(object))
    }

    /// Runs a full collection.
    pub fn collect_garbage(&mut self) {
        let mut roots: Vec<GcRef> = self.modules.modules().collect();
        roots.extend(self.fiber);

        self.heap.mark(roots);
        let dead = self.heap.sweep();
        trace!(
            "Collected {} objects, {} bytes live",
            dead.len(),
            self.heap.stats().bytes_allocated
        );

        for object in dead {
            self.release(object);
        }
    }

    /// Releases host resources owned by a dead object.
    fn release(&mut self, object: HeapObject) {
        if let HeapObject::Module(module) = object {
            if let Some(handle) = module.handle {
                debug!("Unloading library of module {}", module.display_name());
                if let Some(loader) = self.config.loader.as_mut() {
                    loader.unload_foreign_module(handle);
                }
            }
        }
    }

    /// Returns heap usage counters.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Sets or clears the cap on heap bytes.
    pub fn set_heap_limit(&mut self, limit: Option<usize>) {
        self.heap.set_limit(limit);
    }

    /// Loads a module and runs its body if it has not run yet.
    pub fn import(&mut self, name: &str) -> Result<Value> {
        let module = self.load_module(name)?;
        self.run_module(&module)?;
        Ok(module)
    }

    /// Runs a module's body, returning what the body returned. Running an
    /// already initialized module returns null.
    pub fn run_module(&mut self, module: &Value) -> Result<Value> {
        self.call_method(module, "run", &[])
    }

    /// Compiles `source` into the module called `module` and runs it.
    ///
    /// The module is created if needed; an existing module keeps its
    /// variables, so successive calls build on each other.
    pub fn interpret(&mut self, module: &str, source: &str) -> Result<Value> {
        let module = self.load_source(Rc::from(module), None, source)?;
        self.run_module(&Value::Object(module))
    }

    /// Calls a module method such as `run`, `get` or `__str`.
    ///
    /// Safe to call from a native function while a fiber is running: the
    /// interrupted fiber is set aside and resumed as current afterwards.
    pub fn call_method(&mut self, receiver: &Value, method: &str, args: &[Value]) -> Result<Value> {
        let (module, primitive) = self.resolve_method(receiver, method, args.len())?;

        let saved = self.fiber.take();
        let result = match saved {
            Some(fiber) => {
                let mut vm = self.root(fiber);
                vm.call_primitive(primitive, module, args)
            }
            None => self.call_primitive(primitive, module, args),
        };
        self.fiber = saved;
        result
    }

    fn call_primitive(&mut self, primitive: Primitive, module: GcRef, args: &[Value]) -> Result<Value> {
        match primitive(self, module, args)? {
            Flow::Return(value) => Ok(value),
            Flow::Switch => self.execute(),
        }
    }

    pub(crate) fn resolve_method(
        &self,
        receiver: &Value,
        method: &str,
        arity: usize,
    ) -> Result<(GcRef, Primitive)> {
        let Some(module) = receiver
            .as_object()
            .filter(|object| self.heap.as_module(*object).is_some())
        else {
            return Err(Error::type_error(format!(
                "'{}' has no method '{}'",
                self.type_name(receiver),
                method
            )));
        };

        let signature = primitives::signature(method, arity);
        let primitive = primitives::lookup(&signature)
            .ok_or_else(|| Error::type_error(format!("Module has no method '{}'", signature)))?;
        Ok((module, primitive))
    }

    fn expect_module(&self, value: &Value) -> Result<GcRef> {
        value
            .as_object()
            .filter(|object| self.heap.as_module(*object).is_some())
            .ok_or_else(|| Error::type_error("Expected a module"))
    }

    /// Defines or overwrites a variable in a module.
    pub fn define_module_variable(&mut self, module: &Value, name: &str, value: Value) -> Result<()> {
        let module = self.expect_module(module)?;
        self.heap.module_mut(module).namespace.define(name, value);
        Ok(())
    }

    /// Defines or overwrites a core variable. Modules created afterwards
    /// start with it; existing modules are unaffected.
    pub fn define_core_variable(&mut self, name: &str, value: Value) {
        let core = self.core_ref();
        self.heap.module_mut(core).namespace.define(name, value);
    }

    /// Creates a native function owned by `module`.
    ///
    /// The result is not rooted: store it somewhere reachable, such as a
    /// module variable, before allocating anything else.
    pub fn new_foreign_function(
        &mut self,
        module: &Value,
        name: &str,
        arity: i32,
        function: ForeignFunction,
    ) -> Result<Value> {
        let module = self.expect_module(module)?;
        let closure = ForeignClosure::new(Rc::from(name), arity, function, module);
        self.allocate(HeapObject::Foreign(closure)).map(Value::Object)
    }

    /// Reads a module variable, failing like the `get` method does.
    pub fn module_variable(&mut self, module: &Value, name: &str) -> Result<Value> {
        self.call_method(module, "get", &[Value::from(name)])
    }

    /// Returns a module's variable names in definition order.
    pub fn module_names(&self, module: &Value) -> Result<Vec<String>> {
        let module = self.expect_module(module)?;
        Ok(self
            .heap
            .module(module)
            .namespace
            .names()
            .map(|name| name.to_string())
            .collect())
    }

    /// Returns a module's run state.
    pub fn module_state(&self, module: &Value) -> Result<RunState> {
        let module = self.expect_module(module)?;
        Ok(self.heap.module(module).state())
    }

    /// Returns the type name of a value as scripts see it.
    pub fn type_name(&self, value: &Value) -> &'static str {
        match value {
            Value::Object(object) => self.heap.get(*object).type_name(),
            other => other.immediate_type().unwrap_or("object"),
        }
    }

    /// Formats a value for display.
    pub fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.to_string(),
            Value::Object(object) => match self.heap.get(*object) {
                HeapObject::Module(module) => module.to_string(),
                HeapObject::Function(function) => format!("<function {}>", function.name),
                HeapObject::Closure(closure) => {
                    format!("<function {}>", self.heap.function(closure.function).name)
                }
                HeapObject::Foreign(foreign) => format!("<function {}>", foreign.name),
                HeapObject::Fiber(_) => "<fiber>".to_string(),
            },
        }
    }

    /// Writes to the configured output, or stdout.
    pub(crate) fn write_output(&mut self, text: &str) -> Result<()> {
        match self.config.output.as_mut() {
            Some(output) => {
                output.write_all(text.as_bytes())?;
                output.flush()?;
            }
            None => std::io::stdout().lock().write_all(text.as_bytes())?,
        }
        Ok(())
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        for object in self.heap.drain() {
            self.release(object);
        }
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("modules", &self.modules.len())
            .field("fiber", &self.fiber)
            .field("heap", &self.heap.stats())
            .finish()
    }
}
