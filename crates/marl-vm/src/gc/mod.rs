// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Garbage collector for the runtime.
//!
//! This module contains the memory management subsystem:
//! - Slot heap with a free list (`heap`)
//! - Object headers, references and tracing (`object`)
//! - Scoped protection of not-yet-linked objects (`root`)
//!
//! Collection is a stop-the-world mark-and-sweep. Roots are the module
//! registry, the current fiber and the transient protection stack; any
//! allocation may trigger a collection.

pub mod heap;
pub mod object;
pub mod root;

pub use heap::{Heap, HeapStats};
pub use object::{GcRef, HeapObject, ObjectHeader, OBJECT_OVERHEAD};
pub use root::Rooted;
