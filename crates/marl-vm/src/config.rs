// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime configuration supplied by the embedding application.

use std::fmt;
use std::io::Write;

use crate::module::ModuleLoader;

/// Default number of bytes allocated before the first collection.
pub const DEFAULT_INITIAL_HEAP_SIZE: usize = 1024 * 1024;

/// Default lower bound on threshold growth after a collection.
pub const DEFAULT_MINIMUM_HEAP_GROWTH: usize = 64 * 1024;

/// Default threshold growth, as a percentage of live bytes.
pub const DEFAULT_HEAP_GROWTH_PERCENT: usize = 50;

/// Configuration for a [`Vm`](crate::Vm).
///
/// Everything is optional. A VM without a loader can still run code handed
/// to it directly with [`Vm::interpret`](crate::Vm::interpret), but every
/// import fails with an `ImportError`.
pub struct Configuration {
    /// Host module resolution and unload callbacks
    pub loader: Option<Box<dyn ModuleLoader>>,
    /// Destination for the `print` builtin (stdout when unset)
    pub output: Option<Box<dyn Write>>,
    /// Bytes allocated before the first collection
    pub initial_heap_size: usize,
    /// Minimum growth of the collection threshold
    pub minimum_heap_growth: usize,
    /// Threshold growth relative to the bytes surviving a collection
    pub heap_growth_percent: usize,
    /// Hard cap on allocated bytes
    pub heap_limit: Option<usize>,
    /// Collect before every allocation
    pub stress_gc: bool,
}

impl Configuration {
    /// Creates a configuration with default heap settings and no host hooks.
    pub fn new() -> Self {
        Self {
            loader: None,
            output: None,
            initial_heap_size: DEFAULT_INITIAL_HEAP_SIZE,
            minimum_heap_growth: DEFAULT_MINIMUM_HEAP_GROWTH,
            heap_growth_percent: DEFAULT_HEAP_GROWTH_PERCENT,
            heap_limit: None,
            stress_gc: false,
        }
    }

    /// Installs the host module loader.
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Redirects `print` output.
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Sets the number of bytes allocated before the first collection.
    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.initial_heap_size = bytes;
        self
    }

    /// Sets the minimum growth of the collection threshold.
    pub fn with_minimum_heap_growth(mut self, bytes: usize) -> Self {
        self.minimum_heap_growth = bytes;
        self
    }

    /// Sets the threshold growth percentage.
    pub fn with_heap_growth_percent(mut self, percent: usize) -> Self {
        self.heap_growth_percent = percent;
        self
    }

    /// Caps the heap; allocations beyond the cap fail with a `MemoryError`.
    pub fn with_heap_limit(mut self, bytes: usize) -> Self {
        self.heap_limit = Some(bytes);
        self
    }

    /// Enables collection before every allocation.
    pub fn with_stress_gc(mut self, enabled: bool) -> Self {
        self.stress_gc = enabled;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("loader", &self.loader.is_some())
            .field("output", &self.output.is_some())
            .field("initial_heap_size", &self.initial_heap_size)
            .field("minimum_heap_growth", &self.minimum_heap_growth)
            .field("heap_growth_percent", &self.heap_growth_percent)
            .field("heap_limit", &self.heap_limit)
            .field("stress_gc", &self.stress_gc)
            .finish()
    }
}
