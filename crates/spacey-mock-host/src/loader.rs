// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module loader: resolves, evaluates and caches modules

use crate::cache::{CachedModule, ModuleCache};
use crate::fs::FileSystem;
use crate::require::Require;
use crate::resolver::{ModuleResolver, ResolveResult};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use spacey_mock::{
    Eviction, Exports, LoadHook, MockError, ModuleContext, ModuleHost, ModuleId, ModuleRef,
    Requester, Result, Value,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// A module's body: given its `require`, produce its exports
pub type ModuleBody = Arc<dyn Fn(&Require<'_>) -> Result<Exports> + Send + Sync>;

/// CommonJS loader over a [`FileSystem`].
///
/// Script files are evaluated by bodies registered with
/// [`ModuleLoader::define`]; JSON files are parsed from disk.
pub struct ModuleLoader {
    resolver: ModuleResolver,
    cache: ModuleCache,
    bodies: DashMap<ModuleId, ModuleBody>,
    builtins: DashMap<String, ModuleRef>,
    /// Modules whose body is running (circular requires get partial exports)
    loading: Mutex<HashSet<ModuleId>>,
    evaluations: DashMap<ModuleId, usize>,
    hook: RwLock<Option<Arc<dyn LoadHook>>>,
    main: RwLock<Option<ModuleId>>,
}

impl ModuleLoader {
    /// Create a loader reading from `fs`
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            resolver: ModuleResolver::new(fs),
            cache: ModuleCache::new(),
            bodies: DashMap::new(),
            builtins: DashMap::new(),
            loading: Mutex::new(HashSet::new()),
            evaluations: DashMap::new(),
            hook: RwLock::new(None),
            main: RwLock::new(None),
        }
    }

    /// Register the body evaluated when the file at `path` is loaded
    pub fn define<F>(&self, path: impl AsRef<Path>, body: F)
    where
        F: Fn(&Require<'_>) -> Result<Exports> + Send + Sync + 'static,
    {
        let id = ModuleId::from(self.resolver.fs().canonicalize(path.as_ref()).as_path());
        trace!(id = %id, "module body defined");
        self.bodies.insert(id, Arc::new(body));
    }

    /// Provide the exports of a built-in module
    pub fn define_builtin(&self, name: &str, exports: Exports) {
        self.builtins.insert(name.to_string(), Arc::new(exports));
    }

    /// `require(request)` from `requester`, through the load hook if one is installed
    pub fn require(&self, request: &str, requester: &Requester) -> Result<ModuleRef> {
        self.dispatch(request, requester, false)
    }

    /// Load `path` as the program's main module
    pub fn run_main(&self, path: impl AsRef<Path>) -> Result<ModuleRef> {
        let id = ModuleId::from(path.as_ref());
        let requester = ModuleContext::root(id.clone());
        self.dispatch(id.as_str(), &requester, true)
    }

    fn dispatch(&self, request: &str, requester: &Requester, is_main: bool) -> Result<ModuleRef> {
        // Release the slot before calling out; hooks re-enter the loader
        let hook = self.hook.read().clone();
        match hook {
            Some(hook) => hook.load(request, requester, is_main),
            None => self.load_original(request, requester, is_main),
        }
    }

    /// The module cache
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// The resolver
    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// Identity of the main module, once loaded
    pub fn main(&self) -> Option<ModuleId> {
        self.main.read().clone()
    }

    /// How many times the module at `id` has been evaluated
    pub fn evaluations(&self, id: &str) -> usize {
        self.evaluations
            .get(&ModuleId::from(id))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Whether a load hook is installed
    pub fn has_hook(&self) -> bool {
        self.hook.read().is_some()
    }

    fn load_builtin(&self, name: &str) -> Result<ModuleRef> {
        self.builtins
            .get(name)
            .map(|module| module.value().clone())
            .ok_or_else(|| MockError::ModuleResolution {
                module: name.to_string(),
                reason: "built-in module is not provided by this host".to_string(),
            })
    }

    fn load_resolved(
        &self,
        resolved: ResolveResult,
        requester: &Requester,
        is_main: bool,
    ) -> Result<ModuleRef> {
        match resolved {
            ResolveResult::BuiltIn(name) => self.load_builtin(&name),
            ResolveResult::File(path) => {
                let id = ModuleId::from(path.as_path());
                self.load_cached(id, requester, is_main, |id, context| {
                    let body = self
                        .bodies
                        .get(id)
                        .map(|body| body.value().clone())
                        .ok_or_else(|| MockError::ModuleResolution {
                            module: id.to_string(),
                            reason: "no module body registered".to_string(),
                        })?;
                    body(&Require::new(self, context))
                })
            }
            ResolveResult::Json(path) => {
                let id = ModuleId::from(path.as_path());
                self.load_cached(id, requester, is_main, |_, _| {
                    let content = self.resolver.fs().read_to_string(&path)?;
                    let json: serde_json::Value = serde_json::from_str(&content)?;
                    Ok(json_exports(&json))
                })
            }
            ResolveResult::Native(path) => Err(MockError::ModuleResolution {
                module: path.display().to_string(),
                reason: "Native addons (.node) are not supported".to_string(),
            }),
        }
    }

    fn load_cached<F>(
        &self,
        id: ModuleId,
        requester: &Requester,
        is_main: bool,
        evaluate: F,
    ) -> Result<ModuleRef>
    where
        F: FnOnce(&ModuleId, Requester) -> Result<Exports>,
    {
        if let Some(cached) = self.cache.get(&id) {
            if !cached.loaded {
                trace!(id = %id, "circular require; returning partial exports");
            }
            return Ok(cached.exports);
        }
        if !self.loading.lock().insert(id.clone()) {
            trace!(id = %id, "circular require of evicted module");
            return Ok(Arc::new(Exports::new()));
        }

        self.cache.set(
            id.clone(),
            CachedModule {
                exports: Arc::new(Exports::new()),
                loaded: false,
                parent: Some(requester.id().clone()),
            },
        );

        let context = ModuleContext::child(requester, id.clone());
        let result = evaluate(&id, context);
        self.loading.lock().remove(&id);

        match result {
            Ok(exports) => {
                let module = Arc::new(exports);
                self.cache.set(
                    id.clone(),
                    CachedModule {
                        exports: Arc::clone(&module),
                        loaded: true,
                        parent: Some(requester.id().clone()),
                    },
                );
                *self.evaluations.entry(id.clone()).or_insert(0) += 1;
                if is_main {
                    *self.main.write() = Some(id.clone());
                }
                debug!(id = %id, parent = %requester.id(), "module loaded");
                Ok(module)
            }
            Err(err) => {
                self.cache.delete(&id);
                Err(err)
            }
        }
    }
}

impl ModuleHost for ModuleLoader {
    fn resolve_filename(&self, request: &str, requester: &ModuleContext) -> Result<ModuleId> {
        let resolved = self
            .resolver
            .resolve(request, Path::new(requester.id().as_str()))?;
        Ok(ModuleId::new(resolved.id()))
    }

    fn load_original(
        &self,
        request: &str,
        requester: &Requester,
        is_main: bool,
    ) -> Result<ModuleRef> {
        let resolved = self
            .resolver
            .resolve(request, Path::new(requester.id().as_str()))?;
        self.load_resolved(resolved, requester, is_main)
    }

    fn evict(&self, scope: Eviction<'_>) {
        let removed = self.cache.evict(scope);
        trace!(removed, "cache evicted");
    }

    fn install_hook(&self, hook: Arc<dyn LoadHook>) -> Result<()> {
        let mut slot = self.hook.write();
        if let Some(existing) = slot.as_ref() {
            if !Arc::ptr_eq(existing, &hook) {
                return Err(MockError::HookOccupied);
            }
        }
        *slot = Some(hook);
        Ok(())
    }

    fn remove_hook(&self) {
        self.hook.write().take();
    }
}

/// Objects export their keys; anything else becomes the default export
fn json_exports(json: &serde_json::Value) -> Exports {
    match json {
        serde_json::Value::Object(map) => {
            Exports::from_entries(map.iter().map(|(key, value)| (key.as_str(), Value::from(value))))
        }
        other => Exports::from_entries([("default", Value::from(other))]),
    }
}
