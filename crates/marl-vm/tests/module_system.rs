// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module system integration tests
//!
//! Every test drives the VM through the public embedding API with an
//! in-memory loader that records what the VM asked for.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use marl_vm::gc::OBJECT_OVERHEAD;
use marl_vm::{
    Configuration, Error, ForeignFunction, LoadContext, LoadModuleResult, ModuleLoader,
    NativeHandle, Result, RunState, Value, Vm,
};

/// Calls and unloads seen by a [`MapLoader`].
#[derive(Clone, Default)]
struct Log {
    loads: Rc<RefCell<Vec<String>>>,
    unloads: Rc<RefCell<Vec<NativeHandle>>>,
}

impl Log {
    fn loads_of(&self, name: &str) -> usize {
        self.loads.borrow().iter().filter(|n| *n == name).count()
    }

    fn unloads(&self) -> Vec<NativeHandle> {
        self.unloads.borrow().clone()
    }
}

/// Answers lookups from a fixed table; unknown names are not found.
#[derive(Default)]
struct MapLoader {
    modules: HashMap<String, LoadModuleResult>,
    log: Log,
}

impl MapLoader {
    fn source(mut self, name: &str, text: &str) -> Self {
        self.modules
            .insert(name.to_string(), LoadModuleResult::source(text));
        self
    }

    fn answer(mut self, name: &str, result: LoadModuleResult) -> Self {
        self.modules.insert(name.to_string(), result);
        self
    }
}

impl ModuleLoader for MapLoader {
    fn load_module(&mut self, name: &str, _cx: &mut LoadContext<'_>) -> LoadModuleResult {
        self.log.loads.borrow_mut().push(name.to_string());
        self.modules
            .get(name)
            .cloned()
            .unwrap_or(LoadModuleResult::NotFound)
    }

    fn unload_foreign_module(&mut self, handle: NativeHandle) {
        self.log.unloads.borrow_mut().push(handle);
    }
}

/// Output sink the test can read back.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Routes VM trace events to the test harness output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("marl_vm=trace")
        .with_test_writer()
        .try_init();
}

fn vm_with(loader: MapLoader) -> (Vm, Log, SharedBuffer) {
    let log = loader.log.clone();
    let output = SharedBuffer::default();
    let vm = Vm::new(
        Configuration::new()
            .with_loader(loader)
            .with_output(output.clone()),
    );
    (vm, log, output)
}

/// Foreign entry point that counts its own invocations in the module.
fn counting_entry(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let module = &args[0];
    let calls = vm
        .module_variable(module, "calls")
        .ok()
        .and_then(|value| value.as_int())
        .unwrap_or(0);
    vm.define_module_variable(module, "calls", Value::Int(calls + 1))?;
    Ok(Value::from("entered"))
}

/// Foreign entry point that exports a native function.
fn math_entry(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let module = &args[0];
    let double = vm.new_foreign_function(module, "double", 1, double)?;
    vm.define_module_variable(module, "double", double)?;
    Ok(Value::Null)
}

fn double(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match args[0].as_int() {
        Some(n) => Ok(Value::Int(n * 2)),
        None => Err(Error::type_error("Expected an int")),
    }
}

fn failing_entry(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    Err(Error::type_error("entry refused"))
}

fn foreign(entry: marl_vm::ForeignFunction, handle: Option<usize>) -> LoadModuleResult {
    LoadModuleResult::Foreign {
        handle: handle.map(NativeHandle::from_raw),
        entry,
        path: None,
    }
}

// Idempotent resolution

#[test]
fn test_second_load_returns_same_module_without_host() {
    let (mut vm, log, _) = vm_with(MapLoader::default().source("geo", "let pi = 3"));

    let first = vm.load_module("geo").unwrap();
    let second = vm.load_module("geo").unwrap();

    assert_eq!(first, second);
    assert_eq!(log.loads_of("geo"), 1);
}

#[test]
fn test_import_inside_script_uses_registry() {
    let (mut vm, log, _) = vm_with(MapLoader::default().source("geo", "let pi = 3"));

    vm.interpret("main", "import geo\nimport geo as again").unwrap();
    let main = vm.load_module("main").unwrap();

    assert_eq!(log.loads_of("geo"), 1);
    assert_eq!(
        vm.module_variable(&main, "geo").unwrap(),
        vm.module_variable(&main, "again").unwrap()
    );
}

// Seeded namespace stability

#[test]
fn test_new_module_gets_core_snapshot() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("m", ""));
    vm.define_core_variable("a", Value::Int(1));
    vm.define_core_variable("b", Value::Int(2));
    vm.define_core_variable("c", Value::Int(3));

    let module = vm.load_module("m").unwrap();
    vm.define_core_variable("d", Value::Int(4));

    assert_eq!(
        vm.module_names(&module).unwrap(),
        vec!["print", "str", "type", "a", "b", "c"]
    );
    assert_eq!(vm.module_variable(&module, "b").unwrap(), Value::Int(2));
    assert_eq!(vm.module_variable(&module, "d").unwrap_err().kind(), "NameError");
}

#[test]
fn test_module_can_shadow_core_binding() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("m", "let print = 5"));
    let module = vm.import("m").unwrap();

    assert_eq!(vm.module_variable(&module, "print").unwrap(), Value::Int(5));
    let core = vm.core_module();
    let print = vm.module_variable(&core, "print").unwrap();
    assert_eq!(vm.type_name(&print), "function");
}

// Run exactly once

#[test]
fn test_source_body_runs_once() {
    let (mut vm, _, output) = vm_with(MapLoader::default().source("hello", "print(\"body\")"));

    let module = vm.load_module("hello").unwrap();
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Uninitialized);

    vm.run_module(&module).unwrap();
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Initialized);
    assert_eq!(vm.run_module(&module).unwrap(), Value::Null);

    vm.interpret("main", "import hello\nimport hello").unwrap();
    assert_eq!(output.contents(), "body\n");
}

#[test]
fn test_failed_body_is_not_rerun() {
    let (mut vm, log, output) = vm_with(
        MapLoader::default().source("bad", "print(\"start\")\nraise \"boom\""),
    );

    let error = vm.import("bad").unwrap_err();
    assert_eq!(error, Error::Raised("boom".to_string()));

    let module = vm.load_module("bad").unwrap();
    assert_eq!(vm.run_module(&module).unwrap(), Value::Null);
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Initialized);
    assert_eq!(output.contents(), "start\n");
    assert_eq!(log.loads_of("bad"), 1);
}

fn state_of(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let state = vm.module_state(&args[0])?;
    Ok(Value::from(format!("{:?}", state)))
}

fn define_core_function(vm: &mut Vm, name: &str, arity: i32, function: ForeignFunction) {
    let core = vm.core_module();
    let function = vm.new_foreign_function(&core, name, arity, function).unwrap();
    vm.define_core_variable(name, function);
}

#[test]
fn test_body_sees_itself_running() {
    let (mut vm, _, _) = vm_with(
        MapLoader::default().source("geo", "import geo as me\nlet seen = state_of(me)"),
    );
    define_core_function(&mut vm, "state_of", 1, state_of);

    let module = vm.import("geo").unwrap();
    assert_eq!(vm.module_variable(&module, "seen").unwrap(), Value::from("Running"));
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Initialized);
}

#[test]
fn test_nested_interpret_keeps_outer_body_running() {
    fn rerun(vm: &mut Vm, _args: &[Value]) -> Result<Value> {
        vm.interpret("geo", "let nested = 2")
    }

    let (mut vm, _, _) = vm_with(
        MapLoader::default().source("geo", "import geo as me\nrerun()\nlet seen = state_of(me)"),
    );
    define_core_function(&mut vm, "state_of", 1, state_of);
    define_core_function(&mut vm, "rerun", 0, rerun);

    let module = vm.import("geo").unwrap();
    assert_eq!(vm.module_variable(&module, "nested").unwrap(), Value::Int(2));
    assert_eq!(vm.module_variable(&module, "seen").unwrap(), Value::from("Running"));
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Initialized);
}

#[test]
fn test_run_returns_body_value() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("calc", "let x = 40\nx + 2"));
    let module = vm.load_module("calc").unwrap();
    assert_eq!(vm.run_module(&module).unwrap(), Value::Int(42));
}

// Foreign single-shot

#[test]
fn test_foreign_entry_runs_once() {
    let (mut vm, _, _) = vm_with(MapLoader::default().answer("native", foreign(counting_entry, None)));

    let module = vm.load_module("native").unwrap();
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Uninitialized);

    assert_eq!(vm.run_module(&module).unwrap(), Value::from("entered"));
    assert_eq!(vm.run_module(&module).unwrap(), Value::Null);
    vm.interpret("main", "import native").unwrap();

    assert_eq!(vm.module_variable(&module, "calls").unwrap(), Value::Int(1));
    assert_eq!(vm.module_state(&module).unwrap(), RunState::Initialized);
}

#[test]
fn test_foreign_module_exports_functions() {
    let (mut vm, _, _) = vm_with(MapLoader::default().answer("math", foreign(math_entry, None)));

    let result = vm.interpret("main", "from math import double\ndouble(21)").unwrap();
    assert_eq!(result, Value::Int(42));
}

#[test]
fn test_foreign_entry_error_propagates_once() {
    let (mut vm, log, _) = vm_with(
        MapLoader::default().answer("picky", foreign(failing_entry, Some(9))),
    );

    let error = vm.import("picky").unwrap_err();
    assert_eq!(error, Error::type_error("entry refused"));

    // The module was built; only its entry failed
    let module = vm.load_module("picky").unwrap();
    assert_eq!(vm.run_module(&module).unwrap(), Value::Null);
    assert!(log.unloads().is_empty());

    drop(vm);
    assert_eq!(log.unloads(), vec![NativeHandle::from_raw(9)]);
}

// Unresolvable names

#[test]
fn test_not_found_is_retried() {
    let (mut vm, log, _) = vm_with(MapLoader::default());

    for _ in 0..2 {
        let error = vm.load_module("does.not.exist").unwrap_err();
        assert_eq!(error, Error::import("Module not found"));
    }
    assert_eq!(log.loads_of("does.not.exist"), 2);
}

#[test]
fn test_compile_error_is_retried() {
    let (mut vm, log, _) = vm_with(MapLoader::default().source("broken", "let x = \nlet"));

    let error = vm.load_module("broken").unwrap_err();
    assert_eq!(error.kind(), "CompileError");
    assert!(error.message().contains("broken"));

    assert!(vm.load_module("broken").is_err());
    assert_eq!(log.loads_of("broken"), 2);
}

#[test]
fn test_import_error_inside_script() {
    let (mut vm, _, _) = vm_with(MapLoader::default());
    let error = vm.interpret("main", "import missing").unwrap_err();
    assert_eq!(error.to_string(), "ImportError: Module not found");
}

#[test]
fn test_memory_error_prefers_pending_error() {
    struct Exhausted;

    impl ModuleLoader for Exhausted {
        fn load_module(&mut self, name: &str, cx: &mut LoadContext<'_>) -> LoadModuleResult {
            if name == "specific" {
                cx.raise(Error::Memory(format!("{} needs 4 GiB", name)));
            }
            LoadModuleResult::OutOfMemory
        }
    }

    let mut vm = Vm::new(Configuration::new().with_loader(Exhausted));
    assert_eq!(
        vm.load_module("specific").unwrap_err(),
        Error::Memory("specific needs 4 GiB".to_string())
    );
    assert_eq!(vm.load_module("generic").unwrap_err(), Error::out_of_memory());
}

#[test]
fn test_raised_error_does_not_outlive_its_lookup() {
    struct RaisesThenMisses;

    impl ModuleLoader for RaisesThenMisses {
        fn load_module(&mut self, name: &str, cx: &mut LoadContext<'_>) -> LoadModuleResult {
            match name {
                "geo" => LoadModuleResult::source("let pi = 3"),
                "flaky" => {
                    cx.raise(Error::Memory("flaky: cache full".to_string()));
                    LoadModuleResult::NotFound
                }
                _ => LoadModuleResult::OutOfMemory,
            }
        }
    }

    let mut vm = Vm::new(Configuration::new().with_loader(RaisesThenMisses));
    assert_eq!(vm.load_module("flaky").unwrap_err(), Error::import("Module not found"));

    vm.load_module("geo").unwrap();
    vm.load_module("geo").unwrap();
    vm.interpret("main", "import geo").unwrap();

    assert_eq!(vm.load_module("big").unwrap_err(), Error::out_of_memory());
}

// get() scoping

#[test]
fn test_get_does_not_look_elsewhere() {
    let (mut vm, _, _) = vm_with(
        MapLoader::default()
            .source("other", "let x = 1")
            .source("m", "let y = 2"),
    );
    vm.import("other").unwrap();
    let module = vm.import("m").unwrap();

    let error = vm.module_variable(&module, "x").unwrap_err();
    assert_eq!(error, Error::name_error("No such variable 'x' in module 'm'"));
}

#[test]
fn test_get_requires_a_string() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("m", ""));
    let module = vm.import("m").unwrap();

    let error = vm.call_method(&module, "get", &[Value::Int(1)]).unwrap_err();
    assert_eq!(error, Error::type_error("Expected a string"));
}

#[test]
fn test_from_import_missing_name() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("geo", "let pi = 3"));
    let error = vm.interpret("main", "from geo import tau").unwrap_err();
    assert_eq!(error.to_string(), "NameError: No such variable 'tau' in module 'geo'");
}

// Stringify exactness

#[test]
fn test_stringify_formats() {
    let (mut vm, _, _) = vm_with(
        MapLoader::default()
            .answer("geo", LoadModuleResult::source_at("", "/lib/geo.ck"))
            .source("plain", ""),
    );

    let geo = vm.load_module("geo").unwrap();
    assert_eq!(vm.stringify(&geo), "<module \"geo\" at \"/lib/geo.ck\">");

    let plain = vm.load_module("plain").unwrap();
    assert_eq!(vm.stringify(&plain), "<module \"plain\">");
    assert_eq!(
        vm.call_method(&plain, "__str", &[]).unwrap(),
        Value::from("<module \"plain\">")
    );

    let core = vm.core_module();
    assert_eq!(vm.stringify(&core), "<module \"<builtin>\">");
}

#[test]
fn test_str_builtin_uses_module_format() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("geo", ""));
    let result = vm.interpret("main", "import geo\nstr(geo)").unwrap();
    assert_eq!(result, Value::from("<module \"geo\">"));
}

// Handle release on failed foreign construction

#[test]
fn test_failed_foreign_construction_unloads_once() {
    let (mut vm, log, _) = vm_with(
        MapLoader::default().answer("native", foreign(counting_entry, Some(42))),
    );

    // Room for the module object but not for its entry closure
    let used = vm.heap_stats().bytes_allocated;
    vm.set_heap_limit(Some(used + OBJECT_OVERHEAD));

    let error = vm.load_module("native").unwrap_err();
    assert_eq!(error.kind(), "MemoryError");
    assert_eq!(log.unloads(), vec![NativeHandle::from_raw(42)]);

    // Nothing registered: the host is asked again
    vm.set_heap_limit(None);
    vm.collect_garbage();
    assert_eq!(log.unloads(), vec![NativeHandle::from_raw(42)]);

    let module = vm.load_module("native").unwrap();
    assert_eq!(log.loads_of("native"), 2);
    vm.run_module(&module).unwrap();

    drop(vm);
    assert_eq!(
        log.unloads(),
        vec![NativeHandle::from_raw(42), NativeHandle::from_raw(42)]
    );
}

#[test]
fn test_failed_source_construction_leaves_nothing() {
    let (mut vm, log, _) = vm_with(MapLoader::default().source("big", "let x = 1"));

    let used = vm.heap_stats().bytes_allocated;
    vm.set_heap_limit(Some(used + OBJECT_OVERHEAD));

    assert_eq!(vm.load_module("big").unwrap_err().kind(), "MemoryError");
    vm.set_heap_limit(None);
    vm.import("big").unwrap();
    assert_eq!(log.loads_of("big"), 2);
}

// Coroutine handoff

#[test]
fn test_nested_imports_switch_fibers() {
    init_tracing();
    let (mut vm, _, output) = vm_with(
        MapLoader::default()
            .source("a", "print(\"a start\")\nimport b\nprint(\"a end\")")
            .source("b", "print(\"b start\")\nimport c\nprint(\"b end\")")
            .source("c", "print(\"c\")"),
    );

    vm.import("a").unwrap();
    assert_eq!(
        output.contents(),
        "a start\nb start\nc\nb end\na end\n"
    );
}

#[test]
fn test_circular_imports_terminate() {
    let (mut vm, _, _) = vm_with(
        MapLoader::default()
            .source("a", "let x = 1\nimport b\nlet y = b.get(\"z\")")
            .source("b", "import a\nlet z = a.get(\"x\") + 1"),
    );

    let a = vm.import("a").unwrap();
    assert_eq!(vm.module_variable(&a, "y").unwrap(), Value::Int(2));
}

#[test]
fn test_native_reentry_from_script() {
    fn load(vm: &mut Vm, args: &[Value]) -> Result<Value> {
        let Some(name) = args[0].as_str().map(str::to_string) else {
            return Err(Error::type_error("Expected a string"));
        };
        vm.import(&name)
    }

    let (mut vm, _, output) = vm_with(
        MapLoader::default().source("geo", "print(\"geo body\")\nlet pi = 3"),
    );
    let core = vm.core_module();
    let function = vm.new_foreign_function(&core, "load", 1, load).unwrap();
    vm.define_core_variable("load", function);

    let result = vm
        .interpret("main", "let g = load(\"geo\")\nprint(\"back\")\ng.get(\"pi\")")
        .unwrap();
    assert_eq!(result, Value::Int(3));
    assert_eq!(output.contents(), "geo body\nback\n");
}

#[test]
fn test_error_in_nested_module_reaches_host() {
    let (mut vm, _, _) = vm_with(
        MapLoader::default()
            .source("outer", "import inner\nlet after = 1")
            .source("inner", "raise \"inner failed\""),
    );

    let error = vm.import("outer").unwrap_err();
    assert_eq!(error.to_string(), "Error: inner failed");

    let outer = vm.load_module("outer").unwrap();
    assert_eq!(vm.module_variable(&outer, "after").unwrap(), Value::Null);
    assert_eq!(vm.module_state(&outer).unwrap(), RunState::Initialized);

    // The VM is still usable
    assert_eq!(vm.interpret("main", "1 + 1").unwrap(), Value::Int(2));
}

// Interpret

#[test]
fn test_interpret_accumulates_into_module() {
    let (mut vm, _, _) = vm_with(MapLoader::default());

    vm.interpret("__main__", "let count = 1").unwrap();
    vm.interpret("__main__", "count = count + 1").unwrap();
    assert_eq!(vm.interpret("__main__", "count").unwrap(), Value::Int(2));

    // A failed chunk does not lose earlier state
    assert!(vm.interpret("__main__", "count = missing").is_err());
    assert_eq!(vm.interpret("__main__", "count").unwrap(), Value::Int(2));
}

#[test]
fn test_runtime_type_errors() {
    let (mut vm, _, _) = vm_with(MapLoader::default());

    let error = vm.interpret("main", "1 + null").unwrap_err();
    assert_eq!(error, Error::type_error("Cannot add 'int' and 'null'"));

    let error = vm.interpret("main", "let n = 3\nn(1)").unwrap_err();
    assert_eq!(error, Error::type_error("'int' is not callable"));

    let error = vm.interpret("main", "print(1, 2)").unwrap_err();
    assert_eq!(error.kind(), "TypeError");
}

// Collection

#[test]
fn test_stress_collection_during_loads() {
    init_tracing();
    let loader = MapLoader::default()
        .source("geo", "let pi = 3\nlet name = \"geo\"")
        .source("shapes", "from geo import pi\nlet area = pi + 1")
        .answer("math", foreign(math_entry, Some(1)));
    let log = loader.log.clone();

    let mut vm = Vm::new(Configuration::new().with_loader(loader).with_stress_gc(true));
    let result = vm
        .interpret(
            "main",
            "import shapes\nfrom math import double\nlet x = double(shapes.get(\"area\"))\nx + 0",
        )
        .unwrap();

    assert_eq!(result, Value::Int(8));
    assert!(vm.heap_stats().collections > 0);
    assert!(log.unloads().is_empty());

    vm.collect_garbage();
    let geo = vm.load_module("geo").unwrap();
    assert_eq!(vm.module_variable(&geo, "name").unwrap(), Value::from("geo"));
}

#[test]
fn test_finished_bodies_are_collected() {
    let (mut vm, _, _) = vm_with(MapLoader::default().source("geo", "let pi = 3"));
    vm.collect_garbage();
    let baseline = vm.heap_stats().objects;

    vm.import("geo").unwrap();
    vm.collect_garbage();

    // Only the module object survives its finished body
    assert_eq!(vm.heap_stats().objects, baseline + 1);
}
