// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mock session: the fluent controller test code talks to.
//!
//! ```rust,ignore
//! let session = MockSession::new(host, entry_point);
//! session
//!     .select("./lib/math")
//!     .allow_call_through()
//!     .with_exports([("add", stub_add)]);
//!
//! let _guard = session.attach()?;
//! // every require() now goes through the interceptor
//! ```

use crate::error::Result;
use crate::host::{Eviction, LoadHook, ModuleHost, ModuleId, Requester};
use crate::interceptor::{Decision, Interceptor};
use crate::manifest::Manifest;
use crate::passlist::{PassPattern, Passlist};
use crate::plugins::{MockPlugin, PluginChain};
use crate::registry::{MockDescriptor, MockRegistry};
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// State shared by a session and its interceptor
pub(crate) struct SessionState {
    pub(crate) host: Arc<dyn ModuleHost>,
    pub(crate) registry: MockRegistry,
    pub(crate) passlist: RwLock<Passlist>,
    pub(crate) plugins: RwLock<PluginChain>,
    pub(crate) isolation: AtomicBool,
    attached: AtomicBool,
    /// Live armed guards; the last one to drop detaches
    guards: AtomicUsize,
    /// Bumped by every detach so older guards stop counting
    epoch: AtomicUsize,
    touched: Mutex<BTreeSet<ModuleId>>,
    entry_point: RwLock<Requester>,
    current: Mutex<Option<ModuleId>>,
}

impl SessionState {
    pub(crate) fn entry_point(&self) -> Requester {
        Arc::clone(&self.entry_point.read())
    }

    pub(crate) fn touch<I>(&self, ids: I)
    where
        I: IntoIterator<Item = ModuleId>,
    {
        self.touched.lock().extend(ids);
    }

    /// Plugin conversion, then host resolution against the entry point.
    /// Names the host cannot resolve keep their converted spelling so that
    /// modules which do not exist on disk can still be mocked.
    fn canonicalize(&self, name: &str) -> ModuleId {
        let entry = self.entry_point();
        let converted = self.plugins.read().convert_name(name, &entry);
        match self.host.resolve_filename(&converted, &entry) {
            Ok(id) => id,
            Err(err) => {
                debug!(name, converted = %converted, error = %err, "keeping unresolved module name");
                ModuleId::from(converted)
            }
        }
    }
}

/// A mocking session bound to one host.
///
/// Sessions are cheap to clone; clones share state. Independent sessions
/// (one per test worker, each with its own host) never see each other.
#[derive(Clone)]
pub struct MockSession {
    state: Arc<SessionState>,
    interceptor: Arc<Interceptor>,
}

impl MockSession {
    /// Create a session whose test file is `entry_point`
    pub fn new(host: Arc<dyn ModuleHost>, entry_point: Requester) -> Self {
        let state = Arc::new(SessionState {
            host,
            registry: MockRegistry::new(),
            passlist: RwLock::new(Passlist::new()),
            plugins: RwLock::new(PluginChain::new()),
            isolation: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            guards: AtomicUsize::new(0),
            epoch: AtomicUsize::new(0),
            touched: Mutex::new(BTreeSet::new()),
            entry_point: RwLock::new(entry_point),
            current: Mutex::new(None),
        });
        let interceptor = Arc::new(Interceptor::new(Arc::clone(&state)));
        Self { state, interceptor }
    }

    /// The intercepted host
    pub fn host(&self) -> &Arc<dyn ModuleHost> {
        &self.state.host
    }

    /// The module treated as the test itself
    pub fn entry_point(&self) -> Requester {
        self.state.entry_point()
    }

    /// Replace the module treated as the test itself
    pub fn set_entry_point(&self, entry_point: Requester) -> &Self {
        debug!(entry = %entry_point.id(), "entry point changed");
        *self.state.entry_point.write() = entry_point;
        self
    }

    /// Append a plugin to the chain
    pub fn add_plugin(&self, plugin: Arc<dyn MockPlugin>) -> &Self {
        debug!(plugin = plugin.name(), "plugin added");
        self.state.plugins.write().add(plugin);
        self
    }

    /// Names of the registered plugins
    pub fn plugins(&self) -> Vec<String> {
        self.state.plugins.read().names()
    }

    /// Canonicalize `name` as the entry point would request it
    pub fn resolve(&self, name: &str) -> ModuleId {
        self.state.canonicalize(name)
    }

    /// Make `name` the current target, discarding any previous mock for it
    pub fn select(&self, name: &str) -> &Self {
        let id = self.state.canonicalize(name);
        debug!(name, id = %id, "mock selected");
        self.state.registry.clear_one(&id);
        self.state.registry.select(&id);
        *self.state.current.lock() = Some(id);
        self
    }

    /// The identity modifiers currently apply to
    pub fn current_target(&self) -> Option<ModuleId> {
        self.state.current.lock().clone()
    }

    fn modify<F>(&self, operation: &str, f: F) -> &Self
    where
        F: FnOnce(&mut MockDescriptor),
    {
        match self.current_target() {
            Some(id) => self.state.registry.update(&id, f),
            None => warn!(operation, "no module selected; call select() first"),
        }
        self
    }

    /// Merge overrides onto the real module instead of replacing it
    pub fn allow_call_through(&self) -> &Self {
        self.modify("allow_call_through", |d| d.set_call_through(true))
    }

    /// Mark the mock as an ES module
    pub fn as_interop_module(&self) -> &Self {
        self.modify("as_interop_module", |d| d.set_interop(true))
    }

    /// Override the default export and mark the mock as an ES module
    pub fn with_default_export(&self, value: Value) -> &Self {
        self.modify("with_default_export", |d| d.merge([("default", value)]))
            .as_interop_module()
    }

    /// Merge exports into the mock
    pub fn with_exports<I, K>(&self, exports: I) -> &Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.modify("with_exports", |d| d.merge(exports))
    }

    /// Serve the real module `name` in place of the current target
    pub fn delegate_to(&self, name: &str) -> &Self {
        let target = self.state.canonicalize(name);
        self.modify("delegate_to", |d| d.set_delegate(target))
    }

    /// Turn isolation on or off
    pub fn set_isolation(&self, enabled: bool) {
        debug!(enabled, "isolation");
        self.state.isolation.store(enabled, Ordering::SeqCst);
    }

    /// Whether unlisted, unmocked loads are rejected
    pub fn is_isolated(&self) -> bool {
        self.state.isolation.load(Ordering::SeqCst)
    }

    /// Allow matching modules to load under isolation
    pub fn add_passlist_entry(&self, pattern: PassPattern) -> &Self {
        debug!(pattern = %pattern, "passlist entry added");
        self.state.passlist.write().push(pattern);
        self
    }

    /// Snapshot of the passlist
    pub fn passlist(&self) -> Passlist {
        self.state.passlist.read().clone()
    }

    /// Install the interceptor and empty the host's module cache.
    ///
    /// The session stays attached until [`MockSession::detach`] is called or
    /// every guard returned by `attach` has been dropped.
    pub fn attach(&self) -> Result<AttachGuard> {
        let hook: Arc<dyn LoadHook> = self.interceptor.clone();
        self.state.host.install_hook(hook)?;
        if !self.state.attached.swap(true, Ordering::SeqCst) {
            debug!(entry = %self.state.entry_point().id(), "interceptor attached");
        }
        self.state.host.evict(Eviction::All);
        self.state.guards.fetch_add(1, Ordering::SeqCst);
        Ok(AttachGuard {
            session: self.clone(),
            epoch: self.state.epoch.load(Ordering::SeqCst),
            armed: true,
        })
    }

    /// Remove the interceptor, turn isolation off and flush
    pub fn detach(&self) {
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.guards.store(0, Ordering::SeqCst);
        if self.state.attached.swap(false, Ordering::SeqCst) {
            self.state.host.remove_hook();
            debug!("interceptor detached");
        }
        self.set_isolation(false);
        self.flush();
    }

    /// Whether the interceptor is installed
    pub fn is_attached(&self) -> bool {
        self.state.attached.load(Ordering::SeqCst)
    }

    /// Evict every touched module from the host cache.
    ///
    /// Registered mocks survive; only cached instances are dropped.
    pub fn flush(&self) {
        let touched: Vec<ModuleId> = std::mem::take(&mut *self.state.touched.lock())
            .into_iter()
            .collect();
        if !touched.is_empty() {
            debug!(count = touched.len(), "flushing touched modules");
            self.state.host.evict(Eviction::Only(&touched));
        }
    }

    /// Forget every mock and pass pattern, turn isolation off and flush
    pub fn reset(&self) {
        self.state.registry.clear_all();
        self.state.passlist.write().clear();
        *self.state.current.lock() = None;
        self.set_isolation(false);
        self.flush();
    }

    /// Identities evicted or served as mocks since the last flush
    pub fn touched(&self) -> Vec<ModuleId> {
        self.state.touched.lock().iter().cloned().collect()
    }

    /// Identities that currently have a mock
    pub fn mocked_modules(&self) -> Vec<ModuleId> {
        self.state.registry.ids()
    }

    /// The descriptor registered for `name`, if any
    pub fn descriptor(&self, name: &str) -> Option<MockDescriptor> {
        let id = self.state.canonicalize(name);
        self.state.registry.lookup(&id, name)
    }

    /// What the interceptor would do with `request`, without loading anything
    pub fn explain(&self, request: &str, requester: &Requester) -> Result<Decision> {
        self.interceptor.explain(request, requester)
    }

    /// Apply a manifest on top of the current state
    pub fn apply_manifest(&self, manifest: &Manifest) -> Result<&Self> {
        manifest.apply(self)?;
        Ok(self)
    }
}

impl std::fmt::Debug for MockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSession")
            .field("entry_point", self.state.entry_point().id())
            .field("attached", &self.is_attached())
            .field("isolation", &self.is_isolated())
            .field("mocks", &self.state.registry.len())
            .finish()
    }
}

/// Keeps a session attached; detaches it when dropped
#[must_use = "dropping the guard detaches the session"]
pub struct AttachGuard {
    session: MockSession,
    epoch: usize,
    armed: bool,
}

impl AttachGuard {
    /// The attached session
    pub fn session(&self) -> &MockSession {
        &self.session
    }

    /// Detach now
    pub fn detach(self) {
        drop(self);
    }

    /// Leave the session attached after the guard is gone
    pub fn disarm(mut self) -> MockSession {
        self.armed = false;
        self.release();
        self.session.clone()
    }

    /// Give up this guard's hold; true when it was the last one
    fn release(&self) -> bool {
        let state = &self.session.state;
        if state.epoch.load(Ordering::SeqCst) != self.epoch {
            return false;
        }
        state
            .guards
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok_and(|previous| previous == 1)
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if self.armed && self.release() {
            self.session.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubHost;

    fn session() -> (Arc<StubHost>, MockSession) {
        let host = Arc::new(StubHost::with_modules(["/lib/math.js", "/lib/b.js"]));
        let session = MockSession::new(host.clone(), StubHost::entry());
        (host, session)
    }

    #[test]
    fn test_select_canonicalizes_and_clears() {
        let (_, session) = session();
        session.select("./lib/math").with_exports([("add", Value::from(1.0))]);
        assert_eq!(session.current_target(), Some(ModuleId::from("/lib/math.js")));

        session.select("/lib/math.js");
        let descriptor = session.descriptor("./lib/math").unwrap();
        assert!(descriptor.overrides().is_empty());
    }

    #[test]
    fn test_unresolvable_name_is_kept() {
        let (_, session) = session();
        assert_eq!(session.resolve("virtual:config"), ModuleId::from("virtual:config"));
    }

    #[test]
    fn test_modifiers_without_target_are_ignored() {
        let (_, session) = session();
        session.with_exports([("x", Value::Null)]).allow_call_through();
        assert!(session.mocked_modules().is_empty());
    }

    #[test]
    fn test_with_default_export_sets_interop() {
        let (_, session) = session();
        session
            .select("./lib/math")
            .with_default_export(Value::from("default"));

        let descriptor = session.descriptor("./lib/math").unwrap();
        assert!(descriptor.is_interop());
        assert_eq!(descriptor.overrides().get("default"), Some(&Value::from("default")));
    }

    #[test]
    fn test_delegate_to_canonicalizes() {
        let (_, session) = session();
        session.select("./lib/math").delegate_to("./lib/b");

        let descriptor = session.descriptor("./lib/math").unwrap();
        assert_eq!(descriptor.delegate_to(), Some(&ModuleId::from("/lib/b.js")));
    }

    #[test]
    fn test_attach_wipes_cache_and_guard_detaches() {
        let (host, session) = session();
        {
            let _guard = session.attach().unwrap();
            assert!(session.is_attached());
            assert!(host.has_hook());
            assert_eq!(host.full_wipes(), 1);
        }
        assert!(!session.is_attached());
        assert!(!host.has_hook());
    }

    #[test]
    fn test_attach_twice_is_idempotent() {
        let (host, session) = session();
        let first = session.attach().unwrap();
        let second = session.attach().unwrap();
        assert_eq!(host.full_wipes(), 2);

        drop(first);
        assert!(host.has_hook());
        assert!(session.is_attached());
        drop(second);
        assert!(!host.has_hook());
        assert!(!session.is_attached());
    }

    #[test]
    fn test_explicit_detach_outlives_guards() {
        let (host, session) = session();
        let first = session.attach().unwrap();
        let second = session.attach().unwrap();
        session.detach();
        assert!(!host.has_hook());

        drop(first);
        let third = session.attach().unwrap();
        drop(second);
        assert!(host.has_hook());
        drop(third);
        assert!(!host.has_hook());
    }

    #[test]
    fn test_second_session_cannot_steal_hook() {
        let (host, session) = session();
        let other = MockSession::new(host.clone(), StubHost::entry());

        let _guard = session.attach().unwrap();
        assert!(other.attach().is_err());
    }

    #[test]
    fn test_disarm_keeps_session_attached() {
        let (host, session) = session();
        let attached = session.attach().unwrap().disarm();
        assert!(attached.is_attached());
        assert!(host.has_hook());

        session.detach();
        assert!(!host.has_hook());
    }

    #[test]
    fn test_reset_clears_everything_but_plugins() {
        let (_, session) = session();
        session.add_plugin(Arc::new(crate::plugins::RelativePlugin));
        session.select("./lib/math").with_exports([("a", Value::Null)]);
        session.add_passlist_entry(PassPattern::literal("lib"));
        session.set_isolation(true);

        session.reset();

        assert!(session.mocked_modules().is_empty());
        assert!(session.passlist().is_empty());
        assert!(!session.is_isolated());
        assert_eq!(session.current_target(), None);
        assert_eq!(session.plugins(), vec!["relative"]);
    }

    #[test]
    fn test_detach_disables_isolation() {
        let (_, session) = session();
        let guard = session.attach().unwrap();
        session.set_isolation(true);
        guard.detach();
        assert!(!session.is_isolated());
    }
}
