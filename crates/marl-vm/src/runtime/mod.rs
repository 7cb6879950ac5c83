// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime types: values, callables and fibers.

pub mod fiber;
pub mod function;
pub mod value;

pub use fiber::{Fiber, Frame};
pub use function::{Closure, ForeignClosure, ForeignFunction, Function};
pub use value::Value;
