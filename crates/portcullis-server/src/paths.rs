//! Path normalization and glob pattern sets.
//!
//! Patterns and request paths are compared in normalized form: trimmed, with
//! leading and trailing `/` removed. Glob syntax:
//!
//! - `*` - any characters within one segment
//! - `**` - any number of segments; a trailing `/**` also matches zero segments
//! - `?` - a single character within one segment
//!
//! Everything else matches literally.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

/// Normalizes a request path or pattern for comparison.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    path.trim().trim_matches('/')
}

/// Converts a normalized glob into an anchored regular expression.
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        let double_star = chars.get(i + 1) == Some(&'*');
        match chars[i] {
            // trailing "/**" also matches the bare prefix
            '/' if chars.get(i + 1) == Some(&'*')
                && chars.get(i + 2) == Some(&'*')
                && i + 3 == chars.len() =>
            {
                out.push_str("(?:/.*)?");
                i += 3;
            }
            '*' if double_star && chars.get(i + 2) == Some(&'/') => {
                out.push_str("(?:.*/)?");
                i += 3;
            }
            '*' if double_star => {
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

/// One compiled glob.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles `pattern` after normalizing it.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let source = normalize_path(pattern).to_string();
        let regex = Regex::new(&glob_to_regex(&source))?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests an already normalized path.
    pub fn matches(&self, normalized: &str) -> bool {
        self.regex.is_match(normalized)
    }
}

/// Immutable, deduplicated list of compiled globs in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<GlobPattern>,
}

impl PatternSet {
    /// Compiles `patterns`, skipping blanks and duplicates. Patterns that
    /// fail to compile are logged and dropped.
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut compiled = Vec::new();
        for raw in patterns {
            let normalized = normalize_path(raw.as_ref());
            if normalized.is_empty() || !seen.insert(normalized.to_string()) {
                continue;
            }
            match GlobPattern::new(normalized) {
                Ok(pattern) => compiled.push(pattern),
                Err(e) => tracing::warn!(pattern = %normalized, error = %e, "skipping invalid pattern"),
            }
        }
        Self { patterns: compiled }
    }

    /// Returns `true` if any pattern matches `path` (normalized here).
    pub fn matches(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.patterns.iter().any(|p| p.matches(normalized))
    }

    pub fn patterns(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn sources(&self) -> BTreeSet<&str> {
        self.patterns.iter().map(GlobPattern::as_str).collect()
    }

    /// Patterns added and removed going from `self` to `next`.
    pub fn diff(&self, next: &PatternSet) -> PatternDiff {
        let before = self.sources();
        let after = next.sources();
        PatternDiff {
            added: after.difference(&before).map(|s| s.to_string()).collect(),
            removed: before.difference(&after).map(|s| s.to_string()).collect(),
        }
    }
}

/// Change between two pattern sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PatternDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl PatternDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of a wholesale refresh.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A new snapshot was installed.
    Applied(PatternDiff),
    /// The new list equals the current one; nothing was swapped.
    Unchanged,
    /// The previous snapshot was kept.
    Retained { reason: String },
}

impl RefreshOutcome {
    #[must_use]
    pub fn retained(reason: impl Into<String>) -> Self {
        Self::Retained {
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// The published document is what is now enforced.
    pub fn is_in_force(&self) -> bool {
        !matches!(self, Self::Retained { .. })
    }
}

/// A pattern set that is replaced wholesale and read without locks.
///
/// Readers load the current `Arc<PatternSet>` and always see one complete
/// snapshot. Writers build a new set and swap it in.
pub struct PatternRegistry {
    name: &'static str,
    current: ArcSwap<PatternSet>,
}

impl PatternRegistry {
    pub fn new<I, S>(name: &'static str, initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name,
            current: ArcSwap::from_pointee(PatternSet::compile(initial)),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<PatternSet> {
        self.current.load_full()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.current.load().matches(path)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.current.load().patterns()
    }

    /// Replaces the whole set.
    ///
    /// An empty list never replaces a set: the previous snapshot is kept so a
    /// broken source cannot silently change which paths are covered.
    pub fn replace_all<I, S>(&self, patterns: I) -> RefreshOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next = PatternSet::compile(patterns);
        if next.is_empty() {
            tracing::warn!(registry = self.name, "refusing to install an empty pattern list");
            return RefreshOutcome::retained("empty pattern list");
        }

        let current = self.current.load();
        let diff = current.diff(&next);
        if diff.is_empty() && current.len() == next.len() {
            tracing::debug!(registry = self.name, "pattern list unchanged");
            return RefreshOutcome::Unchanged;
        }

        self.current.store(Arc::new(next));
        tracing::info!(
            registry = self.name,
            added = ?diff.added,
            removed = ?diff.removed,
            "pattern list updated"
        );
        RefreshOutcome::Applied(diff)
    }
}
