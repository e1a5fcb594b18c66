// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for module mocking

use thiserror::Error;

/// Result type for mocking operations
pub type Result<T> = std::result::Result<T, MockError>;

/// Errors raised by the interceptor, the host runtime, or manifest loading
#[derive(Debug, Error)]
pub enum MockError {
    /// An unmocked load was rejected because isolation is enabled
    #[error("mockModule: '{request}' is not listed as a passby module")]
    IsolationViolation {
        /// The request string as written by the requesting module
        request: String,
    },

    /// Module not found
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// Module resolution error
    #[error("Error resolving module '{module}': {reason}")]
    ModuleResolution {
        /// Module specifier
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// The host's load hook is already owned by another interceptor
    #[error("A load hook is already installed on this host")]
    HookOccupied,

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A pass pattern failed to compile
    #[error("Invalid pass pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Manifest is structurally valid but semantically wrong
    #[error("Invalid manifest: {0}")]
    Manifest(String),
}

impl MockError {
    /// Create a module not found error
    pub fn module_not_found(module: impl Into<String>) -> Self {
        Self::ModuleNotFound(module.into())
    }

    /// Create an isolation violation for `request`
    pub fn isolation_violation(request: impl Into<String>) -> Self {
        Self::IsolationViolation {
            request: request.into(),
        }
    }

    /// Whether this is the error raised for unlisted loads under isolation
    pub fn is_isolation_violation(&self) -> bool {
        matches!(self, Self::IsolationViolation { .. })
    }
}
