// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mock registry: canonical identity to mock descriptor

use crate::error::Result;
use crate::host::ModuleId;
use crate::value::{ModuleRef, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// How a descriptor answers a load request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy<'a> {
    /// Return the real module behind another identity
    Delegate(&'a ModuleId),
    /// Lay the overrides over the real module
    CallThrough,
    /// Return the overrides object itself
    Replace,
}

/// A real module loaded at most once on behalf of a mock
#[derive(Debug, Default)]
pub(crate) struct Materialized {
    module: OnceLock<ModuleRef>,
    loading: AtomicBool,
}

impl Materialized {
    pub(crate) fn get(&self) -> Option<&ModuleRef> {
        self.module.get()
    }

    /// The stored module, or the result of `load` stored for next time.
    ///
    /// `load` may re-enter through a circular require. While it runs, nested
    /// calls get the loader's answer directly (its partial exports) and
    /// leave the cell for the outer, fully evaluated module.
    pub(crate) fn get_or_load<F>(&self, load: F) -> Result<ModuleRef>
    where
        F: FnOnce() -> Result<ModuleRef>,
    {
        if let Some(module) = self.module.get() {
            return Ok(Arc::clone(module));
        }
        if self.loading.swap(true, Ordering::SeqCst) {
            return load();
        }
        let loaded = load();
        self.loading.store(false, Ordering::SeqCst);
        let module = loaded?;
        Ok(Arc::clone(self.module.get_or_init(|| module)))
    }
}

/// Everything registered for one module
#[derive(Debug, Clone, Default)]
pub struct MockDescriptor {
    /// Replacement exports; also carries the interop marker
    overrides: ModuleRef,
    /// Module whose real instance is served instead
    delegate_to: Option<ModuleId>,
    /// Merge overrides onto the real module
    call_through: bool,
    /// Real module behind `delegate_to`, loaded at most once
    materialized_delegate: Arc<Materialized>,
    /// Real module behind the mocked request, loaded at most once
    materialized_real: Arc<Materialized>,
}

impl MockDescriptor {
    /// The override exports
    pub fn overrides(&self) -> &ModuleRef {
        &self.overrides
    }

    /// Whether overrides follow default-export conventions
    pub fn is_interop(&self) -> bool {
        self.overrides.is_es_module()
    }

    /// Whether call-through is enabled
    pub fn is_call_through(&self) -> bool {
        self.call_through
    }

    /// The delegate identity, if any
    pub fn delegate_to(&self) -> Option<&ModuleId> {
        self.delegate_to.as_ref()
    }

    /// The strategy used when this descriptor is active.
    ///
    /// A delegate wins over call-through, which wins over plain overrides.
    pub fn strategy(&self) -> Strategy<'_> {
        match (&self.delegate_to, self.call_through) {
            (Some(target), _) => Strategy::Delegate(target),
            (None, true) => Strategy::CallThrough,
            (None, false) => Strategy::Replace,
        }
    }

    /// The delegate module if it has been loaded
    pub fn materialized_delegate(&self) -> Option<&ModuleRef> {
        self.materialized_delegate.get()
    }

    /// The real module if call-through has loaded it
    pub fn materialized_real(&self) -> Option<&ModuleRef> {
        self.materialized_real.get()
    }

    pub(crate) fn delegate_cell(&self) -> &Materialized {
        &self.materialized_delegate
    }

    pub(crate) fn real_cell(&self) -> &Materialized {
        &self.materialized_real
    }

    /// Shallow-merge exports into the overrides
    pub fn merge<I, K>(&mut self, partial: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Arc::make_mut(&mut self.overrides).extend(partial);
    }

    /// Mark the overrides as an ES module
    pub fn set_interop(&mut self, interop: bool) {
        Arc::make_mut(&mut self.overrides).set_es_module(interop);
    }

    /// Enable or disable call-through
    pub fn set_call_through(&mut self, enabled: bool) {
        self.call_through = enabled;
    }

    /// Serve another module's real instance instead
    pub fn set_delegate(&mut self, target: ModuleId) {
        self.delegate_to = Some(target);
    }
}

/// Keyed store of mock descriptors.
///
/// Absence is never an error: a missing entry just means "not mocked".
/// Descriptors handed out are snapshots that share their materialization
/// cells with the stored entry.
#[derive(Debug, Default)]
pub struct MockRegistry {
    entries: RwLock<HashMap<ModuleId, MockDescriptor>>,
}

impl MockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the descriptor for `id`, creating an empty one if absent
    pub fn select(&self, id: &ModuleId) -> MockDescriptor {
        self.entries
            .write()
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Shallow-merge exports into the descriptor for `id`
    pub fn merge<I, K>(&self, id: &ModuleId, partial: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.update(id, |descriptor| descriptor.merge(partial));
    }

    /// Mutate the descriptor for `id` in place, creating it if absent
    pub fn update<F>(&self, id: &ModuleId, f: F)
    where
        F: FnOnce(&mut MockDescriptor),
    {
        let mut entries = self.entries.write();
        f(entries.entry(id.clone()).or_default());
    }

    /// Get the descriptor for `id`
    pub fn get(&self, id: &ModuleId) -> Option<MockDescriptor> {
        self.entries.read().get(id).cloned()
    }

    /// Look up by resolved identity, then by the raw request string
    pub fn lookup(&self, resolved: &ModuleId, request: &str) -> Option<MockDescriptor> {
        let entries = self.entries.read();
        entries
            .get(resolved)
            .or_else(|| entries.get(&ModuleId::from(request)))
            .cloned()
    }

    /// Remove the descriptor for `id`
    pub fn clear_one(&self, id: &ModuleId) {
        self.entries.write().remove(id);
    }

    /// Remove every descriptor
    pub fn clear_all(&self) {
        self.entries.write().clear();
    }

    /// All registered identities
    pub fn ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
