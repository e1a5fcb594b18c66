// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Plugins: name conversion and per-request mock vetoes.
//!
//! Plugins run in registration order. Each may rewrite a module name before
//! it is canonicalized, and each may veto a descriptor for a specific
//! request; a descriptor applies only when no plugin vetoes it.

use crate::host::ModuleContext;
use crate::registry::MockDescriptor;
use std::sync::Arc;

/// Extension point for naming and mock selection rules
pub trait MockPlugin: Send + Sync {
    /// Short name used in logs and status output
    fn name(&self) -> &str;

    /// Rewrite `name` as requested from `requester`; `None` keeps it
    fn convert_name(&self, _name: &str, _requester: &ModuleContext) -> Option<String> {
        None
    }

    /// Whether `descriptor` should answer this request
    fn should_mock(
        &self,
        _descriptor: &MockDescriptor,
        _request: &str,
        _requester: &ModuleContext,
        _entry_point: &ModuleContext,
    ) -> bool {
        true
    }
}

/// Ordered plugin chain
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn MockPlugin>>,
}

impl PluginChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin
    pub fn add(&mut self, plugin: Arc<dyn MockPlugin>) {
        self.plugins.push(plugin);
    }

    /// Remove every plugin
    pub fn clear(&mut self) {
        self.plugins.clear();
    }

    /// Names of registered plugins in order
    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Pass `name` through every plugin's conversion
    pub fn convert_name(&self, name: &str, requester: &ModuleContext) -> String {
        self.plugins
            .iter()
            .fold(name.to_string(), |current, plugin| {
                plugin
                    .convert_name(&current, requester)
                    .unwrap_or(current)
            })
    }

    /// Whether every plugin lets `descriptor` answer this request
    pub fn should_mock(
        &self,
        descriptor: &MockDescriptor,
        request: &str,
        requester: &ModuleContext,
        entry_point: &ModuleContext,
    ) -> bool {
        self.plugins
            .iter()
            .all(|plugin| plugin.should_mock(descriptor, request, requester, entry_point))
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Remaps a package prefix, e.g. `@app/db` to `./src/db`
#[derive(Debug, Clone)]
pub struct AliasPlugin {
    from: String,
    to: String,
}

impl AliasPlugin {
    /// Map names equal to `from`, or starting with `from/`, onto `to`
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl MockPlugin for AliasPlugin {
    fn name(&self) -> &str {
        "alias"
    }

    fn convert_name(&self, name: &str, _requester: &ModuleContext) -> Option<String> {
        let rest = name.strip_prefix(self.from.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(format!("{}{}", self.to, rest))
        } else {
            None
        }
    }
}

/// Mocks only apply to modules the entry point requires directly
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativePlugin;

impl MockPlugin for RelativePlugin {
    fn name(&self) -> &str {
        "relative"
    }

    fn should_mock(
        &self,
        _descriptor: &MockDescriptor,
        _request: &str,
        requester: &ModuleContext,
        entry_point: &ModuleContext,
    ) -> bool {
        requester.is_same_module(entry_point)
    }
}

/// Mocks never apply to requests issued from inside `node_modules`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectNodeModules;

impl MockPlugin for ProtectNodeModules {
    fn name(&self) -> &str {
        "protect-node-modules"
    }

    fn should_mock(
        &self,
        _descriptor: &MockDescriptor,
        _request: &str,
        requester: &ModuleContext,
        _entry_point: &ModuleContext,
    ) -> bool {
        !requester
            .id()
            .as_str()
            .replace('\\', "/")
            .contains("/node_modules/")
    }
}
