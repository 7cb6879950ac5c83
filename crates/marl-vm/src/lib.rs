// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # marl-vm
//!
//! An embeddable, bytecode-based scripting runtime built around a
//! host-driven module system.
//!
//! ## Overview
//!
//! The runtime never searches for code on its own. The embedding
//! application installs a [`ModuleLoader`] that answers "where is module
//! `geo`?" with either source text or a natively compiled entry point, and
//! the VM takes care of the rest:
//! - A root registry guaranteeing one live module per name
//! - Namespace seeding from the anonymous core module
//! - Compilation of source modules into a suspended fiber
//! - Single-shot foreign entry points for native modules
//! - A run-state machine that executes each module body exactly once
//! - A mark-and-sweep heap with scoped rooting during construction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marl_vm::{Configuration, LoadContext, LoadModuleResult, ModuleLoader, Vm};
//!
//! struct Inline;
//!
//! impl ModuleLoader for Inline {
//!     fn load_module(&mut self, name: &str, _cx: &mut LoadContext<'_>) -> LoadModuleResult {
//!         match name {
//!             "greeting" => LoadModuleResult::source("let text = \"hello\""),
//!             _ => LoadModuleResult::NotFound,
//!         }
//!     }
//! }
//!
//! let mut vm = Vm::new(Configuration::new().with_loader(Inline));
//! let module = vm.import("greeting")?;
//! assert_eq!(vm.stringify(&module), "<module \"greeting\">");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod config;
pub mod error;
pub mod gc;
pub mod module;
pub mod runtime;
pub mod vm;

// Re-exports for convenience
pub use config::Configuration;
pub use error::{Error, Result};
pub use gc::{GcRef, HeapStats};
pub use module::{
    LoadContext, LoadModuleResult, ModuleLoader, NativeHandle, RunState, MODULE_ENTRY_NAME,
};
pub use runtime::function::ForeignFunction;
pub use runtime::value::Value;
pub use vm::Vm;

/// Version of the marl runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
