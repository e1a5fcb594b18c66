// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CommonJS path resolution over a [`FileSystem`]

use crate::fs::{FileSystem, normalize};
use serde::Deserialize;
use spacey_mock::{MockError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Names served by the host itself rather than from disk
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "crypto",
    "events",
    "fs",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "process",
    "querystring",
    "stream",
    "string_decoder",
    "timers",
    "tty",
    "url",
    "util",
    "zlib",
];

const EXTENSIONS: &[&str] = &["js", "json", "node"];

/// What a request resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// A built-in, by bare name
    BuiltIn(String),
    /// A script module
    File(PathBuf),
    /// A JSON module
    Json(PathBuf),
    /// A native addon
    Native(PathBuf),
}

impl ResolveResult {
    /// The identity a host caches this result under
    pub fn id(&self) -> String {
        match self {
            ResolveResult::BuiltIn(name) => name.clone(),
            ResolveResult::File(path) | ResolveResult::Json(path) | ResolveResult::Native(path) => {
                path.display().to_string()
            }
        }
    }
}

/// Resolves `require()` requests the way Node's CommonJS loader does
pub struct ModuleResolver {
    fs: Arc<dyn FileSystem>,
}

impl ModuleResolver {
    /// Create a resolver reading from `fs`
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// The file system this resolver reads
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Whether `name` (with or without `node:`) is a built-in
    pub fn is_builtin(&self, name: &str) -> bool {
        let name = name.strip_prefix("node:").unwrap_or(name);
        BUILTIN_MODULES.contains(&name)
    }

    /// Resolve `request` as required from the module at `parent`
    pub fn resolve(&self, request: &str, parent: &Path) -> Result<ResolveResult> {
        let request = request.strip_prefix("node:").unwrap_or(request);
        if self.is_builtin(request) {
            return Ok(ResolveResult::BuiltIn(request.to_string()));
        }

        let resolved = if request.starts_with("./")
            || request.starts_with("../")
            || request == "."
            || request == ".."
            || request.starts_with('/')
        {
            let base = parent.parent().unwrap_or(Path::new("/"));
            self.resolve_path(&normalize(&base.join(request)))
        } else {
            self.resolve_package(request, parent)
        };

        let resolved = resolved.ok_or_else(|| MockError::module_not_found(request))?;
        trace!(request, parent = %parent.display(), resolved = %resolved.id(), "resolved");
        Ok(resolved)
    }

    /// Try `path` as a file, then with each extension, then as a directory
    fn resolve_path(&self, path: &Path) -> Option<ResolveResult> {
        self.resolve_as_file(path)
            .or_else(|| self.resolve_as_directory(path))
    }

    fn resolve_as_file(&self, path: &Path) -> Option<ResolveResult> {
        if self.fs.is_file(path) {
            return Some(self.categorize(path));
        }
        EXTENSIONS.iter().find_map(|ext| {
            let mut candidate = path.as_os_str().to_owned();
            candidate.push(".");
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            self.fs
                .is_file(&candidate)
                .then(|| self.categorize(&candidate))
        })
    }

    fn resolve_as_directory(&self, dir: &Path) -> Option<ResolveResult> {
        if !self.fs.is_dir(dir) {
            return None;
        }
        if let Some(main) = self.package_main(dir) {
            let main = normalize(&dir.join(main));
            if let Some(found) = self
                .resolve_as_file(&main)
                .or_else(|| self.resolve_index(&main))
            {
                return Some(found);
            }
        }
        self.resolve_index(dir)
    }

    fn resolve_index(&self, dir: &Path) -> Option<ResolveResult> {
        EXTENSIONS.iter().find_map(|ext| {
            let index = dir.join(format!("index.{}", ext));
            self.fs.is_file(&index).then(|| self.categorize(&index))
        })
    }

    fn package_main(&self, dir: &Path) -> Option<String> {
        let content = self.fs.read_to_string(&dir.join("package.json")).ok()?;
        match serde_json::from_str::<PackageJson>(&content) {
            Ok(package) => package.main,
            Err(err) => {
                trace!(dir = %dir.display(), %err, "ignoring unreadable package.json");
                None
            }
        }
    }

    /// Walk `node_modules` directories from the requester up to the root
    fn resolve_package(&self, request: &str, parent: &Path) -> Option<ResolveResult> {
        let (name, subpath) = parse_package_specifier(request);
        let start = parent.parent()?;

        start
            .ancestors()
            .filter(|dir| dir.file_name().is_none_or(|n| n != "node_modules"))
            .find_map(|dir| {
                let package = dir.join("node_modules").join(name);
                if !self.fs.is_dir(&package) {
                    return None;
                }
                match subpath {
                    Some(sub) => self.resolve_path(&normalize(&package.join(sub))),
                    None => self.resolve_as_directory(&package),
                }
            })
    }

    fn categorize(&self, path: &Path) -> ResolveResult {
        let path = self.fs.canonicalize(path);
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ResolveResult::Json(path),
            Some("node") => ResolveResult::Native(path),
            _ => ResolveResult::File(path),
        }
    }
}

/// Split `@scope/name/sub` or `name/sub` into package name and subpath
pub fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    let name_end = if specifier.starts_with('@') {
        specifier
            .find('/')
            .and_then(|scope_end| {
                specifier[scope_end + 1..]
                    .find('/')
                    .map(|pos| scope_end + 1 + pos)
            })
    } else {
        specifier.find('/')
    };

    match name_end {
        Some(end) => (&specifier[..end], Some(&specifier[end + 1..])),
        None => (specifier, None),
    }
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
}
