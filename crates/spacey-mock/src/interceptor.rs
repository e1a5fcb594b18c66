// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The load interceptor.
//!
//! Installed into the host's hook slot while a session is attached. For each
//! request it resolves the identity, looks for an applicable mock, enforces
//! isolation, and otherwise defers to the host's original loader.

use crate::error::{MockError, Result};
use crate::host::{Eviction, LoadHook, ModuleId, Requester};
use crate::registry::{MockDescriptor, Strategy};
use crate::session::SessionState;
use crate::value::ModuleRef;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What the interceptor does with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The mock's overrides are returned as the module
    Replace {
        /// Identity the mock is registered under
        id: ModuleId,
    },
    /// Overrides are laid over the real module
    CallThrough {
        /// Identity the mock is registered under
        id: ModuleId,
    },
    /// Another module's real instance is returned
    Delegate {
        /// Identity the mock is registered under
        id: ModuleId,
        /// Module actually loaded
        target: ModuleId,
    },
    /// The original loader handles the request
    PassThrough {
        /// Resolved identity
        id: ModuleId,
    },
    /// Isolation rejects the request
    Rejected {
        /// The request as written
        request: String,
    },
}

impl Decision {
    /// Whether a mock answers the request
    pub fn is_mocked(&self) -> bool {
        matches!(
            self,
            Decision::Replace { .. } | Decision::CallThrough { .. } | Decision::Delegate { .. }
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Replace { id } => write!(f, "mock {}", id),
            Decision::CallThrough { id } => write!(f, "call-through {}", id),
            Decision::Delegate { id, target } => write!(f, "delegate {} -> {}", id, target),
            Decision::PassThrough { id } => write!(f, "real {}", id),
            Decision::Rejected { request } => write!(f, "rejected {}", request),
        }
    }
}

enum Route {
    Mock {
        id: ModuleId,
        descriptor: MockDescriptor,
    },
    FallThrough {
        id: ModuleId,
    },
}

/// Load hook serving a session's mocks
pub struct Interceptor {
    state: Arc<SessionState>,
}

impl Interceptor {
    pub(crate) fn new(state: Arc<SessionState>) -> Self {
        Self { state }
    }

    /// Pick a route for `request`.
    ///
    /// A mock can answer a request the host cannot resolve (it is then keyed
    /// by the raw request); without a mock the resolution error propagates.
    fn route(
        &self,
        request: &str,
        requester: &Requester,
        resolved: Result<ModuleId>,
    ) -> Result<Route> {
        let key = match &resolved {
            Ok(id) => id.clone(),
            Err(_) => ModuleId::from(request),
        };
        let entry = self.state.entry_point();

        if let Some(descriptor) = self.state.registry.lookup(&key, request) {
            let plugins = self.state.plugins.read().clone();
            if plugins.should_mock(&descriptor, request, requester, &entry) {
                return Ok(Route::Mock {
                    id: key,
                    descriptor,
                });
            }
            trace!(request, requester = %requester.id(), "mock vetoed by plugin");
        }

        let id = resolved?;
        if self.state.isolation.load(Ordering::SeqCst) {
            let passlist = self.state.passlist.read().clone();
            if !passlist.is_passed(&id, requester, &entry) {
                return Err(MockError::isolation_violation(request));
            }
        }
        Ok(Route::FallThrough { id })
    }

    /// Describe the route for `request` without loading or evicting anything
    pub fn explain(&self, request: &str, requester: &Requester) -> Result<Decision> {
        let resolved = self.state.host.resolve_filename(request, requester);
        match self.route(request, requester, resolved) {
            Ok(Route::Mock { id, descriptor }) => Ok(match descriptor.strategy() {
                Strategy::Delegate(target) => Decision::Delegate {
                    target: target.clone(),
                    id,
                },
                Strategy::CallThrough => Decision::CallThrough { id },
                Strategy::Replace => Decision::Replace { id },
            }),
            Ok(Route::FallThrough { id }) => Ok(Decision::PassThrough { id }),
            Err(MockError::IsolationViolation { request }) => Ok(Decision::Rejected { request }),
            Err(err) => Err(err),
        }
    }

    fn serve(
        &self,
        descriptor: &MockDescriptor,
        request: &str,
        requester: &Requester,
        is_main: bool,
    ) -> Result<ModuleRef> {
        let host = &self.state.host;
        match descriptor.strategy() {
            Strategy::Delegate(target) => descriptor
                .delegate_cell()
                .get_or_load(|| host.load_original(target.as_str(), requester, is_main)),
            Strategy::CallThrough => {
                let real = descriptor
                    .real_cell()
                    .get_or_load(|| host.load_original(request, requester, is_main))?;
                Ok(Arc::new(real.overlay(descriptor.overrides())))
            }
            Strategy::Replace => Ok(Arc::clone(descriptor.overrides())),
        }
    }
}

impl LoadHook for Interceptor {
    fn load(&self, request: &str, requester: &Requester, is_main: bool) -> Result<ModuleRef> {
        let state = &self.state;
        let resolved = state.host.resolve_filename(request, requester);

        // The test file always gets a fresh instance of what it requires
        if let Ok(id) = &resolved {
            if requester.is_same_module(&state.entry_point()) {
                state.host.evict(Eviction::Only(std::slice::from_ref(id)));
                state.touch([id.clone()]);
            }
        }

        match self.route(request, requester, resolved) {
            Ok(Route::Mock { id, descriptor }) => {
                debug!(request, id = %id, requester = %requester.id(), "serving mock");
                // The requester captured a mock and must be reloaded later too
                state.touch([requester.id().clone(), id]);
                self.serve(&descriptor, request, requester, is_main)
            }
            Ok(Route::FallThrough { id }) => {
                trace!(request, id = %id, "falling through to original loader");
                state.host.load_original(request, requester, is_main)
            }
            Err(err) => {
                if err.is_isolation_violation() {
                    warn!(request, requester = %requester.id(), "load rejected by isolation");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ModuleContext, ModuleHost};
    use crate::passlist::PassPattern;
    use crate::plugins::RelativePlugin;
    use crate::session::MockSession;
    use crate::testing::StubHost;
    use crate::value::{Exports, Value};

    fn setup() -> (Arc<StubHost>, MockSession, Requester) {
        let host = Arc::new(StubHost::with_modules([
            "/lib/math.js",
            "/lib/a.js",
            "/lib/b.js",
            "/src/app.js",
        ]));
        let entry = StubHost::entry();
        let session = MockSession::new(host.clone(), Arc::clone(&entry));
        (host, session, entry)
    }

    #[test]
    fn test_transparent_without_mocks() {
        let (host, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        let _guard = session.attach().unwrap();

        let direct = host.load_original("./lib/math", &app, false).unwrap();
        let through = host.require("./lib/math", &app).unwrap();
        assert!(Arc::ptr_eq(&direct, &through));
        assert_eq!(host.loads("/lib/math.js"), 1);
    }

    #[test]
    fn test_plain_mock_never_loads_real_module() {
        let (host, session, entry) = setup();
        let stub_add = Value::function("add", |_| Value::Number(0.0));
        session.select("./lib/math").with_exports([("add", stub_add.clone())]);
        let _guard = session.attach().unwrap();

        let module = host.require("./lib/math", &entry).unwrap();
        assert_eq!(*module, Exports::from_entries([("add", stub_add)]));
        assert_eq!(host.loads("/lib/math.js"), 0);

        let again = host.require("./lib/math", &entry).unwrap();
        assert!(Arc::ptr_eq(&module, &again));
    }

    #[test]
    fn test_call_through_loads_once() {
        let (host, session, entry) = setup();
        let stub_add = Value::function("add", |_| Value::Number(0.0));
        session
            .select("./lib/math")
            .allow_call_through()
            .with_exports([("add", stub_add.clone())]);
        let _guard = session.attach().unwrap();

        let first = host.require("./lib/math", &entry).unwrap();
        let second = host.require("./lib/math", &entry).unwrap();

        assert_eq!(host.loads("/lib/math.js"), 1);
        assert_eq!(first.get("add"), Some(&stub_add));
        assert_eq!(first.get("name"), Some(&Value::from("/lib/math.js")));
        assert_eq!(*first, *second);

        let descriptor = session.descriptor("./lib/math").unwrap();
        assert!(descriptor.materialized_real().is_some());
    }

    #[test]
    fn test_call_through_keeps_real_interop_marker() {
        let (host, session, entry) = setup();
        host.mark_es_module("/lib/math.js");
        session
            .select("./lib/math")
            .allow_call_through()
            .with_default_export(Value::Null);
        let _guard = session.attach().unwrap();

        assert!(host.require("./lib/math", &entry).unwrap().is_es_module());

        host.unmark_es_module("/lib/math.js");
        session
            .select("./lib/math")
            .allow_call_through()
            .with_default_export(Value::Null);
        host.evict(Eviction::All);
        assert!(!host.require("./lib/math", &entry).unwrap().is_es_module());
    }

    #[test]
    fn test_delegate_returns_other_real_module() {
        let (host, session, entry) = setup();
        session.select("./lib/a").delegate_to("./lib/b");
        let _guard = session.attach().unwrap();

        let a = host.require("./lib/a", &entry).unwrap();
        let again = host.require("./lib/a", &entry).unwrap();
        let b = host.load_original("./lib/b", &entry, false).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(host.loads("/lib/b.js"), 1);
        assert_eq!(host.loads("/lib/a.js"), 0);
    }

    #[test]
    fn test_isolation_rejects_and_passlist_admits() {
        let (host, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        let _guard = session.attach().unwrap();
        session.set_isolation(true);

        let err = host.require("./lib/math", &app).unwrap_err();
        assert!(matches!(err, MockError::IsolationViolation { ref request } if request == "./lib/math"));

        session.add_passlist_entry(PassPattern::literal("/lib/math.js"));
        assert!(host.require("./lib/math", &app).is_ok());
    }

    #[test]
    fn test_isolation_allows_entry_point() {
        let (host, session, entry) = setup();
        let _guard = session.attach().unwrap();
        session.set_isolation(true);

        assert!(host.require("./lib/math", &entry).is_ok());
    }

    #[test]
    fn test_isolation_allows_self_parented_requester() {
        let (host, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        let looped = ModuleContext::child(&app, "/src/app.js");
        let _guard = session.attach().unwrap();
        session.set_isolation(true);

        assert!(host.require("./lib/math", &looped).is_ok());
        assert!(host.require("./lib/math", &app).is_err());
    }

    #[test]
    fn test_mock_served_under_isolation() {
        let (host, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        session.select("./lib/math").with_exports([("pi", Value::from(3.0))]);
        let _guard = session.attach().unwrap();
        session.set_isolation(true);

        let module = host.require("./lib/math", &app).unwrap();
        assert_eq!(module.get("pi"), Some(&Value::from(3.0)));
    }

    #[test]
    fn test_unresolvable_request_served_by_raw_mock() {
        let (host, session, entry) = setup();
        session.select("virtual:config").with_exports([("debug", Value::from(true))]);
        let _guard = session.attach().unwrap();

        let module = host.require("virtual:config", &entry).unwrap();
        assert_eq!(module.get("debug"), Some(&Value::from(true)));

        let err = host.require("virtual:missing", &entry).unwrap_err();
        assert!(matches!(err, MockError::ModuleNotFound(_)));
    }

    #[test]
    fn test_plugin_veto_falls_through() {
        let (host, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        session.add_plugin(Arc::new(RelativePlugin));
        session.select("./lib/math").with_exports([("add", Value::Null)]);
        let _guard = session.attach().unwrap();

        assert!(host.require("./lib/math", &entry).unwrap().has("add"));
        let real = host.require("./lib/math", &app).unwrap();
        assert!(!real.has("add"));
        assert_eq!(real.get("name"), Some(&Value::from("/lib/math.js")));
    }

    #[test]
    fn test_touched_tracking_and_flush() {
        let (host, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        session.select("./lib/math").with_exports([("add", Value::Null)]);
        let _guard = session.attach().unwrap();

        host.require("./lib/math", &app).unwrap();
        assert_eq!(
            session.touched(),
            vec![ModuleId::from("/lib/math.js"), ModuleId::from("/src/app.js")]
        );

        host.require("./lib/b", &app).unwrap();
        assert!(host.is_cached("/lib/b.js"));

        session.flush();
        assert!(session.touched().is_empty());
        assert!(session.descriptor("./lib/math").is_some());
        assert_eq!(
            host.evicted(),
            vec![ModuleId::from("/lib/math.js"), ModuleId::from("/src/app.js")]
        );
        assert!(host.is_cached("/lib/b.js"));
    }

    #[test]
    fn test_entry_point_requests_are_evicted_first() {
        let (host, session, entry) = setup();
        let _guard = session.attach().unwrap();

        host.require("./lib/b", &entry).unwrap();
        host.require("./lib/b", &entry).unwrap();

        assert_eq!(host.loads("/lib/b.js"), 2);
        assert_eq!(session.touched(), vec![ModuleId::from("/lib/b.js")]);
    }

    #[test]
    fn test_explain() {
        let (_, session, entry) = setup();
        let app = ModuleContext::child(&entry, "/src/app.js");
        session.select("./lib/a").delegate_to("./lib/b");
        session.select("./lib/math").allow_call_through();
        session.set_isolation(true);

        assert_eq!(
            session.explain("./lib/a", &entry).unwrap(),
            Decision::Delegate {
                id: ModuleId::from("/lib/a.js"),
                target: ModuleId::from("/lib/b.js"),
            }
        );
        assert_eq!(
            session.explain("./lib/math", &app).unwrap(),
            Decision::CallThrough {
                id: ModuleId::from("/lib/math.js")
            }
        );
        assert_eq!(
            session.explain("./lib/b", &app).unwrap(),
            Decision::Rejected {
                request: "./lib/b".to_string()
            }
        );
        assert_eq!(
            session.explain("./lib/b", &entry).unwrap(),
            Decision::PassThrough {
                id: ModuleId::from("/lib/b.js")
            }
        );
        assert!(session.touched().is_empty());
    }
}
