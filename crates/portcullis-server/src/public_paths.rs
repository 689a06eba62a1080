//! Paths that bypass authentication.

use std::sync::Arc;

use crate::paths::{PatternRegistry, PatternSet, RefreshOutcome};

/// Runtime-mutable set of public path patterns.
///
/// Public only means "no credential required"; public requests still go
/// through the rate limiter.
pub struct PublicPathRegistry {
    inner: PatternRegistry,
}

impl PublicPathRegistry {
    /// Creates the registry with the configured startup patterns.
    pub fn new<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = PatternRegistry::new("public_paths", initial);
        tracing::debug!(patterns = ?inner.patterns(), "public paths initialized");
        Self { inner }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.inner.matches(path)
    }

    pub fn replace_all<I, S>(&self, patterns: I) -> RefreshOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.replace_all(patterns)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.inner.patterns()
    }

    pub fn snapshot(&self) -> Arc<PatternSet> {
        self.inner.snapshot()
    }
}
