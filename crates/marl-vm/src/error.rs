// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the runtime

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Script-visible runtime errors.
///
/// Every variant is catchable from the script's point of view: raising one
/// never damages the module registry or modules other than the one being
/// loaded. Internal consistency violations are panics, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Module resolution failed at the host boundary
    #[error("ImportError: {0}")]
    Import(String),

    /// Module source failed to compile
    #[error("CompileError: {0}")]
    Compile(String),

    /// Allocation exhaustion
    #[error("MemoryError: {0}")]
    Memory(String),

    /// Wrong kind of argument or receiver
    #[error("TypeError: {0}")]
    Type(String),

    /// Variable missing from a module namespace
    #[error("NameError: {0}")]
    Name(String),

    /// Error raised by script code
    #[error("Error: {0}")]
    Raised(String),

    /// Host I/O failure surfaced through the embedding API
    #[error("IOError: {0}")]
    Io(String),
}

impl Error {
    /// Create a new ImportError
    pub fn import(msg: impl Into<String>) -> Self {
        Self::Import(msg.into())
    }

    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Create a new NameError
    pub fn name_error(msg: impl Into<String>) -> Self {
        Self::Name(msg.into())
    }

    /// Create the generic allocation failure error
    pub fn out_of_memory() -> Self {
        Self::Memory("Allocation failure".to_string())
    }

    /// Returns the script-visible class name of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Import(_) => "ImportError",
            Error::Compile(_) => "CompileError",
            Error::Memory(_) => "MemoryError",
            Error::Type(_) => "TypeError",
            Error::Name(_) => "NameError",
            Error::Raised(_) => "Error",
            Error::Io(_) => "IOError",
        }
    }

    /// Returns the message without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Import(msg)
            | Error::Compile(msg)
            | Error::Memory(msg)
            | Error::Type(msg)
            | Error::Name(msg)
            | Error::Raised(msg)
            | Error::Io(msg) => msg,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error.to_string())
    }
}
