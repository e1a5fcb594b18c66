// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loaded-module cache

use dashmap::DashMap;
use spacey_mock::{Eviction, ModuleId, ModuleRef};

/// One cache entry
#[derive(Debug, Clone)]
pub struct CachedModule {
    /// Exports; partial while `loaded` is false
    pub exports: ModuleRef,
    /// Whether evaluation finished
    pub loaded: bool,
    /// The module that first required this one
    pub parent: Option<ModuleId>,
}

/// Thread-safe map from module identity to its loaded instance
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: DashMap<ModuleId, CachedModule>,
}

impl ModuleCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry
    pub fn get(&self, id: &ModuleId) -> Option<CachedModule> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// Whether `id` is cached
    pub fn has(&self, id: &ModuleId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace an entry
    pub fn set(&self, id: ModuleId, module: CachedModule) {
        self.entries.insert(id, module);
    }

    /// Remove one entry
    pub fn delete(&self, id: &ModuleId) -> Option<CachedModule> {
        self.entries.remove(id).map(|(_, module)| module)
    }

    /// Drop entries per `scope`; returns how many were removed
    pub fn evict(&self, scope: Eviction<'_>) -> usize {
        match scope {
            Eviction::All => {
                let removed = self.entries.len();
                self.entries.clear();
                removed
            }
            Eviction::Only(ids) => ids.iter().filter(|id| self.delete(id).is_some()).count(),
        }
    }

    /// Cached identities, sorted
    pub fn keys(&self) -> Vec<ModuleId> {
        let mut keys: Vec<_> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of cached modules
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacey_mock::Exports;
    use std::sync::Arc;

    fn entry() -> CachedModule {
        CachedModule {
            exports: Arc::new(Exports::new()),
            loaded: true,
            parent: None,
        }
    }

    #[test]
    fn test_set_get_delete() {
        let cache = ModuleCache::new();
        let id = ModuleId::from("/a.js");

        cache.set(id.clone(), entry());
        assert!(cache.has(&id));
        assert!(cache.get(&id).unwrap().loaded);
        assert!(cache.delete(&id).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_only() {
        let cache = ModuleCache::new();
        for id in ["/a.js", "/b.js", "/c.js"] {
            cache.set(ModuleId::from(id), entry());
        }

        let removed = cache.evict(Eviction::Only(&[
            ModuleId::from("/a.js"),
            ModuleId::from("/missing.js"),
        ]));

        assert_eq!(removed, 1);
        assert_eq!(cache.keys(), vec![ModuleId::from("/b.js"), ModuleId::from("/c.js")]);
    }

    #[test]
    fn test_evict_all() {
        let cache = ModuleCache::new();
        cache.set(ModuleId::from("/a.js"), entry());
        cache.set(ModuleId::from("/b.js"), entry());

        assert_eq!(cache.evict(Eviction::All), 2);
        assert_eq!(cache.len(), 0);
    }
}
