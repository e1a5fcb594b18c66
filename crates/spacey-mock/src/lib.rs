// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-mock
//!
//! Module-load interception for tests running on a Spacey module host.
//!
//! A [`MockSession`] records which modules to replace and how. Attaching the
//! session installs an [`Interceptor`] into the host's single load hook; from
//! then on every `require()` is either:
//!
//! - served from a mock (plain overrides, overrides merged over the real
//!   module, or another module's real instance),
//! - rejected because isolation is on and the module is not passlisted, or
//! - handed to the host's original loader untouched.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_mock::{MockSession, ModuleContext, PassPattern, Value};
//!
//! let session = MockSession::new(host.clone(), ModuleContext::root("/project/test/app.test.js"));
//! session
//!     .select("../src/db")
//!     .with_exports([("connect", Value::function("connect", |_| Value::Null))]);
//! session.add_passlist_entry(PassPattern::glob("**/node_modules/**")?);
//! session.set_isolation(true);
//!
//! let _guard = session.attach()?;
//! // run the code under test; the guard detaches on drop
//! ```
//!
//! Hosts implement [`ModuleHost`]; `spacey-mock-host` provides a CommonJS
//! implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod host;
pub mod interceptor;
pub mod manifest;
pub mod passlist;
pub mod plugins;
pub mod registry;
pub mod session;
pub mod value;

#[cfg(test)]
mod testing;

// Re-exports
pub use error::{MockError, Result};
pub use host::{Eviction, LoadHook, ModuleContext, ModuleHost, ModuleId, Requester};
pub use interceptor::{Decision, Interceptor};
pub use manifest::{Manifest, ManifestFormat, MockSpec, PatternSpec, PluginSpec};
pub use passlist::{PassPattern, Passlist};
pub use plugins::{AliasPlugin, MockPlugin, PluginChain, ProtectNodeModules, RelativePlugin};
pub use registry::{MockDescriptor, MockRegistry, Strategy};
pub use session::{AttachGuard, MockSession};
pub use value::{Exports, ModuleRef, NativeFunction, Value};

/// Version of the spacey-mock engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
