// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Passlist: modules allowed to load for real while isolation is on

use crate::error::{MockError, Result};
use crate::host::{ModuleContext, ModuleId};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

type PathPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// One admission rule, tested against canonical module paths
#[derive(Clone)]
pub enum PassPattern {
    /// Matches when the path contains the text
    Literal(String),
    /// Matches when the expression finds a match in the path
    Regex(Regex),
    /// Matches the whole path against a shell glob
    Glob(glob::Pattern),
    /// Arbitrary predicate over the path
    Predicate(Arc<PathPredicate>),
}

impl PassPattern {
    /// Substring pattern
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Compile a regular expression pattern
    pub fn regex(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(Self::Regex)
            .map_err(|e| MockError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })
    }

    /// Compile a glob pattern
    pub fn glob(source: &str) -> Result<Self> {
        glob::Pattern::new(source)
            .map(Self::Glob)
            .map_err(|e| MockError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })
    }

    /// Wrap a predicate
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// Test a canonical path
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PassPattern::Literal(text) => path.contains(text.as_str()),
            PassPattern::Regex(re) => re.is_match(path),
            PassPattern::Glob(pattern) => pattern.matches(path),
            PassPattern::Predicate(f) => f(path),
        }
    }
}

impl fmt::Debug for PassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassPattern::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            PassPattern::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            PassPattern::Glob(pattern) => {
                f.debug_tuple("Glob").field(&pattern.as_str()).finish()
            }
            PassPattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Display for PassPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassPattern::Literal(text) => write!(f, "'{}'", text),
            PassPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            PassPattern::Glob(pattern) => write!(f, "glob({})", pattern.as_str()),
            PassPattern::Predicate(_) => write!(f, "[Function]"),
        }
    }
}

/// Ordered set of pass patterns
#[derive(Debug, Clone, Default)]
pub struct Passlist {
    patterns: Vec<PassPattern>,
}

impl Passlist {
    /// Create an empty passlist
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pattern
    pub fn push(&mut self, pattern: PassPattern) {
        self.patterns.push(pattern);
    }

    /// Remove every pattern
    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// Registered patterns in insertion order
    pub fn patterns(&self) -> &[PassPattern] {
        &self.patterns
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern is registered
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern matches `path`
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    /// Decide whether a load of `target` by `requester` may proceed.
    ///
    /// The entry point (and a module declared as its own parent) may load
    /// anything. Otherwise the target is tested first, then the file of each
    /// requester up the chain, so a passed module passes everything it loads.
    /// The topmost module, which has no parent, is never tested itself.
    pub fn is_passed(
        &self,
        target: &ModuleId,
        requester: &ModuleContext,
        entry_point: &ModuleContext,
    ) -> bool {
        if requester.is_same_module(entry_point) || requester.is_self_parented() {
            return true;
        }

        let mut candidate = target;
        let mut cursor = Some(requester);
        while let Some(ctx) = cursor {
            if self.matches(candidate.as_str()) {
                return true;
            }
            candidate = ctx.id();
            cursor = ctx.parent().map(|p| &**p);
        }
        false
    }
}
