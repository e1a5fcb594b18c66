// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The `require` handle passed to module bodies

use crate::loader::ModuleLoader;
use spacey_mock::{ModuleHost, ModuleId, ModuleRef, Requester, Result};
use std::path::Path;

/// `require` as seen from inside one module
pub struct Require<'a> {
    loader: &'a ModuleLoader,
    module: Requester,
}

impl<'a> Require<'a> {
    pub(crate) fn new(loader: &'a ModuleLoader, module: Requester) -> Self {
        Self { loader, module }
    }

    /// `require(request)`
    pub fn require(&self, request: &str) -> Result<ModuleRef> {
        self.loader.require(request, &self.module)
    }

    /// `require.resolve(request)`; never consults the load hook
    pub fn resolve(&self, request: &str) -> Result<ModuleId> {
        self.loader.resolve_filename(request, &self.module)
    }

    /// `require.cache` keys
    pub fn cache(&self) -> Vec<ModuleId> {
        self.loader.cache().keys()
    }

    /// `require.main`
    pub fn main(&self) -> Option<ModuleId> {
        self.loader.main()
    }

    /// `module`
    pub fn module(&self) -> &Requester {
        &self.module
    }

    /// `__filename`
    pub fn filename(&self) -> &ModuleId {
        self.module.id()
    }

    /// `__dirname`
    pub fn dirname(&self) -> &Path {
        Path::new(self.module.id().as_str())
            .parent()
            .unwrap_or(Path::new("/"))
    }
}
