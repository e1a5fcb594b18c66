// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The seam between the mocking engine and a module runtime.
//!
//! A host provides filename resolution, its native (original) loader, a
//! module cache that can be evicted, and exactly one load hook slot. The
//! interceptor is installed into that slot while a session is attached.

use crate::error::Result;
use crate::value::ModuleRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Canonical identity of a loadable module.
///
/// Usually an absolute filename, or the bare name of a built-in module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap an already-canonical name
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&Path> for ModuleId {
    fn from(path: &Path) -> Self {
        Self(path.display().to_string())
    }
}

/// Shared handle to a requesting module
pub type Requester = Arc<ModuleContext>;

/// The module that issued a load request, linked to the module that loaded it
#[derive(Debug)]
pub struct ModuleContext {
    id: ModuleId,
    parent: Option<Requester>,
}

impl ModuleContext {
    /// A context with no parent (the process entry)
    pub fn root(id: impl Into<ModuleId>) -> Requester {
        Arc::new(Self {
            id: id.into(),
            parent: None,
        })
    }

    /// A context loaded by `parent`
    pub fn child(parent: &Requester, id: impl Into<ModuleId>) -> Requester {
        Arc::new(Self {
            id: id.into(),
            parent: Some(Arc::clone(parent)),
        })
    }

    /// The module's own identity
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// The module that loaded this one
    pub fn parent(&self) -> Option<&Requester> {
        self.parent.as_ref()
    }

    /// Whether both contexts refer to the same module
    pub fn is_same_module(&self, other: &ModuleContext) -> bool {
        self.id == other.id
    }

    /// Whether the declared parent is this very module
    pub fn is_self_parented(&self) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|parent| parent.id == self.id)
    }

    /// This context followed by each of its ancestors
    pub fn ancestors(&self) -> impl Iterator<Item = &ModuleContext> {
        std::iter::successors(Some(self), |ctx| ctx.parent().map(|p| &**p))
    }
}

/// Which entries to drop from a host's module cache
#[derive(Debug, Clone, Copy)]
pub enum Eviction<'a> {
    /// Every cached module
    All,
    /// Only the listed identities
    Only(&'a [ModuleId]),
}

/// A loader installed into a host's hook slot.
///
/// Every `require` the host sees while the hook is installed is routed here.
/// Hooks may re-enter the host (and so themselves) while loading.
pub trait LoadHook: Send + Sync {
    /// Load `request` on behalf of `requester`
    fn load(&self, request: &str, requester: &Requester, is_main: bool) -> Result<ModuleRef>;
}

/// A module runtime that can be intercepted
pub trait ModuleHost: Send + Sync {
    /// Resolve `request` as seen from `requester` to a canonical identity
    fn resolve_filename(&self, request: &str, requester: &ModuleContext) -> Result<ModuleId>;

    /// Load through the native loader, bypassing any installed hook
    fn load_original(&self, request: &str, requester: &Requester, is_main: bool)
    -> Result<ModuleRef>;

    /// Drop cached modules so the next request re-enters the loader
    fn evict(&self, scope: Eviction<'_>);

    /// Claim the hook slot. Installing the hook that already occupies the
    /// slot succeeds; any other hook fails with `HookOccupied`.
    fn install_hook(&self, hook: Arc<dyn LoadHook>) -> Result<()>;

    /// Release the hook slot
    fn remove_hook(&self);
}
