// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Declarative mock manifests (`mocks.toml` / `mocks.json`).
//!
//! ```toml
//! isolation = true
//! pass-by = [{ glob = "**/node_modules/**" }, { regex = "src/util/.*" }]
//! plugins = ["relative", { alias = { from = "@app", to = "./src" } }]
//!
//! [[mocks]]
//! module = "./src/db"
//! exports = { connect = "stub" }
//! call-through = true
//!
//! [[mocks]]
//! module = "./src/clock"
//! by = "./test/fake-clock"
//! ```

use crate::error::{MockError, Result};
use crate::passlist::PassPattern;
use crate::plugins::{AliasPlugin, MockPlugin, ProtectNodeModules, RelativePlugin};
use crate::session::MockSession;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// On-disk manifest format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ManifestFormat {
    /// Pick a format from a file extension; anything but `.json` is TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ManifestFormat::Json,
            _ => ManifestFormat::Toml,
        }
    }
}

/// A pass pattern as written in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternSpec {
    /// Substring match
    Literal(String),
    /// Regular expression
    Regex(String),
    /// Shell glob
    Glob(String),
}

impl PatternSpec {
    /// Compile into a pass pattern
    pub fn compile(&self) -> Result<PassPattern> {
        match self {
            PatternSpec::Literal(text) => Ok(PassPattern::literal(text.clone())),
            PatternSpec::Regex(source) => PassPattern::regex(source),
            PatternSpec::Glob(source) => PassPattern::glob(source),
        }
    }
}

/// A plugin as named in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginSpec {
    /// [`RelativePlugin`]
    Relative,
    /// [`ProtectNodeModules`]
    ProtectNodeModules,
    /// [`AliasPlugin`]
    Alias {
        /// Prefix to replace
        from: String,
        /// Replacement
        to: String,
    },
}

impl PluginSpec {
    /// Instantiate the plugin
    pub fn build(&self) -> Arc<dyn MockPlugin> {
        match self {
            PluginSpec::Relative => Arc::new(RelativePlugin),
            PluginSpec::ProtectNodeModules => Arc::new(ProtectNodeModules),
            PluginSpec::Alias { from, to } => Arc::new(AliasPlugin::new(from, to)),
        }
    }
}

/// One mocked module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MockSpec {
    /// Module name as the test would require it
    pub module: String,
    /// Exports to merge into the mock
    pub exports: BTreeMap<String, serde_json::Value>,
    /// Default export; implies `es6`
    pub default: Option<serde_json::Value>,
    /// Mark the mock as an ES module
    pub es6: bool,
    /// Lay exports over the real module
    pub call_through: bool,
    /// Serve this module's real instance instead
    pub by: Option<String>,
}

/// A full mock manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Manifest {
    /// Reject unmocked, unlisted loads
    pub isolation: bool,
    /// Modules allowed to load under isolation
    pub pass_by: Vec<PatternSpec>,
    /// Plugins appended to the session's chain
    pub plugins: Vec<PluginSpec>,
    /// Mocked modules
    pub mocks: Vec<MockSpec>,
}

impl Manifest {
    /// Load a manifest, picking the format from the extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, ManifestFormat::from_path(path))
    }

    /// Parse manifest text
    pub fn parse(content: &str, format: ManifestFormat) -> Result<Self> {
        let manifest: Manifest = match format {
            ManifestFormat::Toml => toml::from_str(content)?,
            ManifestFormat::Json => serde_json::from_str(content)?,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for (index, mock) in self.mocks.iter().enumerate() {
            if mock.module.trim().is_empty() {
                return Err(MockError::Manifest(format!(
                    "mock #{} has no module name",
                    index + 1
                )));
            }
            if mock.by.is_some() && mock.call_through {
                return Err(MockError::Manifest(format!(
                    "mock '{}' sets both `by` and `call-through`",
                    mock.module
                )));
            }
        }
        Ok(())
    }

    /// Apply every setting to `session`.
    ///
    /// Patterns are compiled before anything is changed, so an invalid
    /// pattern leaves the session untouched.
    pub fn apply(&self, session: &MockSession) -> Result<()> {
        self.validate()?;
        let patterns = self
            .pass_by
            .iter()
            .map(PatternSpec::compile)
            .collect::<Result<Vec<_>>>()?;

        for plugin in &self.plugins {
            session.add_plugin(plugin.build());
        }
        for pattern in patterns {
            session.add_passlist_entry(pattern);
        }
        for mock in &self.mocks {
            session.select(&mock.module).with_exports(
                mock.exports
                    .iter()
                    .map(|(name, value)| (name.as_str(), Value::from(value))),
            );
            if let Some(default) = &mock.default {
                session.with_default_export(Value::from(default));
            }
            if mock.es6 {
                session.as_interop_module();
            }
            if mock.call_through {
                session.allow_call_through();
            }
            if let Some(by) = &mock.by {
                session.delegate_to(by);
            }
        }
        if self.isolation {
            session.set_isolation(true);
        }

        debug!(
            mocks = self.mocks.len(),
            patterns = self.pass_by.len(),
            plugins = self.plugins.len(),
            "manifest applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ModuleId;
    use crate::registry::Strategy;
    use crate::testing::StubHost;

    const TOML_MANIFEST: &str = r#"
isolation = true
pass-by = [{ literal = "node_modules" }, { regex = "^/lib/" }, { glob = "/vendor/**" }]
plugins = ["relative", "protect-node-modules", { alias = { from = "@lib", to = "./lib" } }]

[[mocks]]
module = "@lib/math"
exports = { add = 1, label = "stub" }
call-through = true

[[mocks]]
module = "./lib/a"
by = "./lib/b"

[[mocks]]
module = "./lib/b"
default = { answer = 42 }
"#;

    #[test]
    fn test_parse_toml() {
        let manifest = Manifest::parse(TOML_MANIFEST, ManifestFormat::Toml).unwrap();

        assert!(manifest.isolation);
        assert_eq!(
            manifest.pass_by,
            vec![
                PatternSpec::Literal("node_modules".into()),
                PatternSpec::Regex("^/lib/".into()),
                PatternSpec::Glob("/vendor/**".into()),
            ]
        );
        assert_eq!(
            manifest.plugins[2],
            PluginSpec::Alias {
                from: "@lib".into(),
                to: "./lib".into()
            }
        );
        assert_eq!(manifest.mocks.len(), 3);
        assert!(manifest.mocks[0].call_through);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "isolation": false,
            "pass-by": [{ "regex": "fixtures" }],
            "mocks": [{ "module": "./lib/math", "es6": true }]
        }"#;
        let manifest = Manifest::parse(json, ManifestFormat::Json).unwrap();

        assert!(!manifest.isolation);
        assert!(manifest.mocks[0].es6);
        assert!(manifest.plugins.is_empty());
    }

    #[test]
    fn test_rejects_unnamed_mock() {
        let err = Manifest::parse("[[mocks]]\nes6 = true\n", ManifestFormat::Toml).unwrap_err();
        assert!(matches!(err, MockError::Manifest(_)));
    }

    #[test]
    fn test_rejects_conflicting_strategies() {
        let text = "[[mocks]]\nmodule = \"./a\"\nby = \"./b\"\ncall-through = true\n";
        let err = Manifest::parse(text, ManifestFormat::Toml).unwrap_err();
        assert!(matches!(err, MockError::Manifest(_)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ManifestFormat::from_path(Path::new("mocks.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("mocks.toml")), ManifestFormat::Toml);
        assert_eq!(ManifestFormat::from_path(Path::new("mocks")), ManifestFormat::Toml);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mocks.json");
        std::fs::write(&path, r#"{ "mocks": [{ "module": "./lib/a" }] }"#).unwrap();

        let manifest = Manifest::from_path(&path).unwrap();
        assert_eq!(manifest.mocks[0].module, "./lib/a");
    }

    #[test]
    fn test_apply() {
        let host = Arc::new(StubHost::with_modules(["/lib/math.js", "/lib/a.js", "/lib/b.js"]));
        let session = MockSession::new(host, StubHost::entry());
        let manifest = Manifest::parse(TOML_MANIFEST, ManifestFormat::Toml).unwrap();

        session.apply_manifest(&manifest).unwrap();

        assert!(session.is_isolated());
        assert_eq!(session.passlist().len(), 3);
        assert_eq!(
            session.plugins(),
            vec!["relative", "protect-node-modules", "alias"]
        );
        assert_eq!(
            session.mocked_modules(),
            vec![
                ModuleId::from("/lib/a.js"),
                ModuleId::from("/lib/b.js"),
                ModuleId::from("/lib/math.js"),
            ]
        );

        let math = session.descriptor("@lib/math").unwrap();
        assert_eq!(math.strategy(), Strategy::CallThrough);
        assert_eq!(math.overrides().get("label"), Some(&Value::from("stub")));

        let a = session.descriptor("./lib/a").unwrap();
        assert_eq!(a.delegate_to(), Some(&ModuleId::from("/lib/b.js")));

        let b = session.descriptor("./lib/b").unwrap();
        assert!(b.is_interop());
        assert!(matches!(b.overrides().get("default"), Some(Value::Object(_))));
    }

    #[test]
    fn test_invalid_pattern_leaves_session_untouched() {
        let host = Arc::new(StubHost::with_modules(["/lib/a.js"]));
        let session = MockSession::new(host, StubHost::entry());
        let manifest = Manifest {
            isolation: true,
            pass_by: vec![PatternSpec::Regex("(".into())],
            mocks: vec![MockSpec {
                module: "./lib/a".into(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert!(session.apply_manifest(&manifest).is_err());
        assert!(!session.is_isolated());
        assert!(session.mocked_modules().is_empty());
    }
}
