// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! In-memory host used by unit tests.
//!
//! Paths: `./x` and `/x` resolve to `/x.js`; bare names resolve only if a
//! module is registered under exactly that name. Each real module exports
//! `name` set to its own identity.

use crate::error::{MockError, Result};
use crate::host::{Eviction, LoadHook, ModuleContext, ModuleHost, ModuleId, Requester};
use crate::value::{Exports, ModuleRef, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct StubHost {
    modules: Mutex<HashMap<ModuleId, ModuleRef>>,
    cache: Mutex<HashMap<ModuleId, ModuleRef>>,
    loads: Mutex<HashMap<ModuleId, usize>>,
    evicted: Mutex<Vec<ModuleId>>,
    full_wipes: Mutex<usize>,
    hook: RwLock<Option<Arc<dyn LoadHook>>>,
}

impl StubHost {
    pub(crate) fn with_modules<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let host = Self::default();
        for id in ids {
            host.modules
                .lock()
                .insert(ModuleId::from(id), Arc::new(real_module(id, false)));
        }
        host
    }

    pub(crate) fn entry() -> Requester {
        ModuleContext::root("/test.js")
    }

    pub(crate) fn require(&self, request: &str, requester: &Requester) -> Result<ModuleRef> {
        let hook = self.hook.read().clone();
        match hook {
            Some(hook) => hook.load(request, requester, false),
            None => self.load_original(request, requester, false),
        }
    }

    pub(crate) fn mark_es_module(&self, id: &str) {
        self.modules
            .lock()
            .insert(ModuleId::from(id), Arc::new(real_module(id, true)));
    }

    pub(crate) fn unmark_es_module(&self, id: &str) {
        self.modules
            .lock()
            .insert(ModuleId::from(id), Arc::new(real_module(id, false)));
    }

    pub(crate) fn loads(&self, id: &str) -> usize {
        self.loads
            .lock()
            .get(&ModuleId::from(id))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn is_cached(&self, id: &str) -> bool {
        self.cache.lock().contains_key(&ModuleId::from(id))
    }

    pub(crate) fn evicted(&self) -> Vec<ModuleId> {
        self.evicted.lock().clone()
    }

    pub(crate) fn full_wipes(&self) -> usize {
        *self.full_wipes.lock()
    }

    pub(crate) fn has_hook(&self) -> bool {
        self.hook.read().is_some()
    }
}

fn real_module(id: &str, es_module: bool) -> Exports {
    let mut exports = Exports::from_entries([("name", Value::from(id))]);
    exports.set_es_module(es_module);
    exports
}

impl ModuleHost for StubHost {
    fn resolve_filename(&self, request: &str, _requester: &ModuleContext) -> Result<ModuleId> {
        let candidate = if let Some(rest) = request.strip_prefix("./") {
            format!("/{}", rest)
        } else {
            request.to_string()
        };
        let candidate = if candidate.starts_with('/') && !candidate.ends_with(".js") {
            format!("{}.js", candidate)
        } else {
            candidate
        };
        let id = ModuleId::from(candidate);
        if self.modules.lock().contains_key(&id) {
            Ok(id)
        } else {
            Err(MockError::module_not_found(request))
        }
    }

    fn load_original(
        &self,
        request: &str,
        requester: &Requester,
        _is_main: bool,
    ) -> Result<ModuleRef> {
        let id = self.resolve_filename(request, requester)?;
        if let Some(cached) = self.cache.lock().get(&id) {
            return Ok(Arc::clone(cached));
        }
        *self.loads.lock().entry(id.clone()).or_default() += 1;
        let module = self
            .modules
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| MockError::module_not_found(request))?;
        self.cache.lock().insert(id, Arc::clone(&module));
        Ok(module)
    }

    fn evict(&self, scope: Eviction<'_>) {
        match scope {
            Eviction::All => {
                self.cache.lock().clear();
                *self.full_wipes.lock() += 1;
            }
            Eviction::Only(ids) => {
                let mut cache = self.cache.lock();
                for id in ids {
                    cache.remove(id);
                }
                self.evicted.lock().extend(ids.iter().cloned());
            }
        }
    }

    fn install_hook(&self, hook: Arc<dyn LoadHook>) -> Result<()> {
        let mut slot = self.hook.write();
        match slot.as_ref() {
            Some(existing) if !Arc::ptr_eq(existing, &hook) => Err(MockError::HookOccupied),
            _ => {
                *slot = Some(hook);
                Ok(())
            }
        }
    }

    fn remove_hook(&self) {
        self.hook.write().take();
    }
}
