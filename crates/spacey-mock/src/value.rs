// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Export values and module export objects.
//!
//! A loaded module is an [`Exports`] object shared behind an `Arc`
//! ([`ModuleRef`]). Two loads "return the same module" when their refs are
//! pointer-equal, mirroring object identity in the runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a module's export object
pub type ModuleRef = Arc<Exports>;

type NativeFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A native function usable as a stub export
pub struct NativeFunction {
    /// The function name
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Value {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A value stored under an export name.
///
/// Values are designed to be thread-safe and can be safely shared
/// between sessions.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Plain object
    Object(BTreeMap<String, Value>),
    /// Function reference
    Function(Arc<NativeFunction>),
    /// Another module's export object
    Module(ModuleRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            // NaN never equals itself
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Wrap a closure as a named native function
    pub fn function<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Function(Arc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Call the value if it is a function
    pub fn call(&self, args: &[Value]) -> Option<Value> {
        match self {
            Value::Function(func) => Some(func.call(args)),
            _ => None,
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Module(_) => "object",
            Value::Function(_) => "function",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", key, value)?;
                }
                write!(f, " }}")
            }
            Value::Function(func) => write!(f, "[Function: {}]", func.name),
            Value::Module(module) => write!(f, "{}", module),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ModuleRef> for Value {
    fn from(module: ModuleRef) -> Self {
        Value::Module(module)
    }
}

/// Convert serde_json::Value to an export value
impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::Array(arr.iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A module's export object.
///
/// `es_module` corresponds to the `__esModule` interop marker: consumers
/// treat `default` as the default export instead of the whole object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exports {
    entries: BTreeMap<String, Value>,
    es_module: bool,
}

impl Exports {
    /// Create an empty export object
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an export object from name/value pairs
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut exports = Self::new();
        exports.extend(entries);
        exports
    }

    /// Get an export by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// Check if an export exists
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Set an export, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }

    /// Shallow-merge exports; later keys win
    pub fn extend<I, K>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in entries {
            self.entries.insert(name.into(), value);
        }
    }

    /// Export names in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of exports
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the object has no exports
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the object carries the ES module interop marker
    pub fn is_es_module(&self) -> bool {
        self.es_module
    }

    /// Set the ES module interop marker
    pub fn set_es_module(&mut self, es_module: bool) {
        self.es_module = es_module;
    }

    /// Lay `overrides` over `self`.
    ///
    /// Every export of `self` survives unless `overrides` names it. The
    /// interop marker always comes from `self`.
    pub fn overlay(&self, overrides: &Exports) -> Exports {
        let mut merged = self.clone();
        merged.extend(overrides.iter().map(|(k, v)| (k, v.clone())));
        merged.es_module = self.es_module;
        merged
    }
}

impl fmt::Display for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.es_module {
            write!(f, "[Module] ")?;
        }
        if self.entries.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", key, value)?;
        }
        write!(f, " }}")
    }
}
