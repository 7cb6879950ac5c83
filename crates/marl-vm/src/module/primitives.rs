// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Methods every module value responds to.

use tracing::debug;

use super::object::Initializer;
use crate::error::{Error, Result};
use crate::gc::GcRef;
use crate::runtime::Value;
use crate::vm::Vm;

/// How a primitive hands control back to the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    /// The call finished with a value
    Return(Value),
    /// The VM switched to another fiber; its result arrives when it finishes
    Switch,
}

/// A module method. Receives the receiver module and the arguments.
pub(crate) type Primitive = fn(&mut Vm, GcRef, &[Value]) -> Result<Flow>;

/// Module methods keyed by `name@arity`.
const MODULE_PRIMITIVES: &[(&str, Primitive)] = &[
    ("run@0", run),
    ("get@1", get),
    ("__str@0", to_string),
];

/// Finds a module method by signature.
pub(crate) fn lookup(signature: &str) -> Option<Primitive> {
    MODULE_PRIMITIVES
        .iter()
        .find(|(name, _)| *name == signature)
        .map(|(_, primitive)| *primitive)
}

/// Builds the lookup signature of a method call.
pub(crate) fn signature(method: &str, arity: usize) -> String {
    format!("{}@{}", method, arity)
}

/// Runs the module body if it has not run yet.
fn run(vm: &mut Vm, module: GcRef, _args: &[Value]) -> Result<Flow> {
    let Some(initializer) = vm.heap.module_mut(module).start() else {
        return Ok(Flow::Return(Value::Null));
    };

    match initializer {
        Initializer::Entry(entry) => {
            let function = vm.heap.foreign(entry).function;
            debug!("Calling entry point of module {}", vm.heap.module(module).display_name());
            function(vm, &[Value::Object(module)]).map(Flow::Return)
        }
        Initializer::Fiber(fiber) => {
            let caller = vm.fiber;
            let body = vm.heap.fiber_mut(fiber);
            assert!(
                body.is_runnable(),
                "module fiber is not in its initial state"
            );
            body.caller = caller;
            vm.fiber = Some(fiber);
            debug!("Switching to body of module {}", vm.heap.module(module).display_name());
            Ok(Flow::Switch)
        }
    }
}

/// Reads a variable from the module's own namespace.
fn get(vm: &mut Vm, module: GcRef, args: &[Value]) -> Result<Flow> {
    let Some(name) = args.first().and_then(Value::as_str) else {
        return Err(Error::type_error("Expected a string"));
    };

    let module = vm.heap.module(module);
    match module.namespace.lookup(name) {
        Some(value) => Ok(Flow::Return(value.clone())),
        None => Err(Error::name_error(format!(
            "No such variable '{}' in module '{}'",
            name,
            module.display_name()
        ))),
    }
}

fn to_string(vm: &mut Vm, module: GcRef, _args: &[Value]) -> Result<Flow> {
    Ok(Flow::Return(Value::from(vm.heap.module(module).to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_signature() {
        assert!(lookup("run@0").is_some());
        assert!(lookup("get@1").is_some());
        assert!(lookup("__str@0").is_some());
        assert!(lookup("run@1").is_none());
        assert!(lookup("get@0").is_none());
        assert!(lookup("missing@0").is_none());
    }

    #[test]
    fn test_signature() {
        assert_eq!(signature("get", 1), "get@1");
    }
}
