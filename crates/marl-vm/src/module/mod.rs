// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The module system.
//!
//! - `registry`: One live module per name
//! - `namespace`: Ordered module variables and literal caches
//! - `object`: The module object, its run state and creation
//! - `loader`: Host callbacks and the load orchestrator
//! - `primitives`: `run`, `get` and `__str` on module values

pub mod loader;
pub mod namespace;
pub mod object;
pub(crate) mod primitives;
pub mod registry;

pub use loader::{LoadContext, LoadModuleResult, ModuleLoader, NativeHandle, MODULE_ENTRY_NAME};
pub use namespace::{Namespace, StringTable};
pub use object::{Initializer, Module, RunState, BUILTIN_MODULE_NAME};
pub use registry::ModuleRegistry;
