// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! File system access for module resolution

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The file operations resolution needs
pub trait FileSystem: Send + Sync {
    /// Whether `path` is a regular file
    fn is_file(&self, path: &Path) -> bool;

    /// Whether `path` is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Read a whole file
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Canonical form of an existing path
    fn canonicalize(&self, path: &Path) -> PathBuf;
}

/// The host operating system's file system
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl FileSystem for RealFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| normalize(path))
    }
}

/// An in-memory file tree; directories exist implicitly
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<PathBuf, String>>,
}

impl MemoryFs {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree holding empty files at `paths`
    pub fn with_files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let fs = Self::new();
        for path in paths {
            fs.add_file(path, "");
        }
        fs
    }

    /// Add or replace a file
    pub fn add_file(&self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files
            .write()
            .insert(normalize(path.as_ref()), contents.into());
    }

    /// Remove a file
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files.write().remove(&normalize(path.as_ref()));
    }
}

impl FileSystem for MemoryFs {
    fn is_file(&self, path: &Path) -> bool {
        self.files.read().contains_key(&normalize(path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let dir = normalize(path);
        self.files
            .read()
            .keys()
            .any(|file| file != &dir && file.starts_with(&dir))
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .read()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such file: {}", path.display()),
                )
            })
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        normalize(path)
    }
}

/// Lexically remove `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c.js")), PathBuf::from("/a/c.js"));
        assert_eq!(normalize(Path::new("/a/b/../../x")), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("a/../../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_memory_fs_dirs_are_implicit() {
        let fs = MemoryFs::with_files(["/project/node_modules/lodash/index.js"]);

        assert!(fs.is_file(Path::new("/project/node_modules/lodash/index.js")));
        assert!(fs.is_dir(Path::new("/project/node_modules/lodash")));
        assert!(fs.is_dir(Path::new("/project")));
        assert!(!fs.is_dir(Path::new("/project/node_modules/lodash/index.js")));
        assert!(!fs.is_file(Path::new("/project/node_modules/lodash")));
    }

    #[test]
    fn test_memory_fs_read() {
        let fs = MemoryFs::new();
        fs.add_file("/pkg/package.json", r#"{"main":"lib/main.js"}"#);

        assert_eq!(
            fs.read_to_string(Path::new("/pkg/./package.json")).unwrap(),
            r#"{"main":"lib/main.js"}"#
        );
        fs.remove_file("/pkg/package.json");
        assert!(fs.read_to_string(Path::new("/pkg/package.json")).is_err());
    }

    #[test]
    fn test_real_fs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("index.js");
        std::fs::write(&file, "module.exports = 1").unwrap();

        assert!(RealFs.is_file(&file));
        assert!(RealFs.is_dir(dir.path()));
        assert_eq!(RealFs.read_to_string(&file).unwrap(), "module.exports = 1");
    }
}
