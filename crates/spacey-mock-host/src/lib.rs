// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-mock-host
//!
//! A CommonJS module host for `spacey-mock`.
//!
//! - Node-style resolution: built-ins, relative and absolute paths with
//!   extension probing, `package.json` `main`, `index` files and
//!   `node_modules` lookup
//! - A module cache with partial exports for circular requires
//! - JSON modules read from disk
//! - Script modules evaluated by Rust closures registered per file
//!
//! ```rust,ignore
//! use spacey_mock_host::{MemoryFs, ModuleLoader};
//!
//! let fs = Arc::new(MemoryFs::with_files(["/app/db.js"]));
//! let loader = Arc::new(ModuleLoader::new(fs));
//! loader.define("/app/db.js", |_| Ok(Exports::new()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cache;
pub mod fs;
mod loader;
mod require;
pub mod resolver;

pub use cache::{CachedModule, ModuleCache};
pub use fs::{FileSystem, MemoryFs, RealFs};
pub use loader::{ModuleBody, ModuleLoader};
pub use require::Require;
pub use resolver::{BUILTIN_MODULES, ModuleResolver, ResolveResult};
