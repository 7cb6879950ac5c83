// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Native functions every module starts with.

use std::rc::Rc;

use super::Vm;
use crate::error::Result;
use crate::gc::HeapObject;
use crate::runtime::{ForeignClosure, ForeignFunction, Value};

const BUILTINS: &[(&str, i32, ForeignFunction)] = &[
    ("print", 1, print),
    ("str", 1, to_str),
    ("type", 1, type_of),
];

/// Defines the builtins in the core module.
///
/// Runs during bootstrap, before any heap limit can matter, so the objects
/// are stored directly.
pub(super) fn install(vm: &mut Vm) {
    let core = vm.core_ref();
    for &(name, arity, function) in BUILTINS {
        let closure = ForeignClosure::new(Rc::from(name), arity, function, core);
        let closure = vm.heap.insert(HeapObject::Foreign(closure));
        vm.heap
            .module_mut(core)
            .namespace
            .define(name, Value::Object(closure));
    }
}

fn print(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let mut text = args.first().map(|value| vm.stringify(value)).unwrap_or_default();
    text.push('\n');
    vm.write_output(&text)?;
    Ok(Value::Null)
}

fn to_str(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::from(args.first().map(|value| vm.stringify(value)).unwrap_or_default()))
}

fn type_of(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Ok(Value::from(args.first().map_or("null", |value| vm.type_name(value))))
}
