//! Scope engine (C5).
//!
//! A scope is a `/`-delimited sequence of non-empty UTF-8 segments. This module owns
//! parsing, canonicalisation, ancestor checks and prefix-filter expansion; nothing else
//! in the crate constructs a canonical scope string by hand.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::MnemoError;

pub const MAX_SCOPE_LEN: usize = 255;
pub const MAX_SEGMENT_LEN: usize = 50;

/// A parsed, canonical scope path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope(String);

impl Scope {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a search or listing operation filters by scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScopeFilter {
    Any,
    Exact(Scope),
    Prefix(Scope),
}

impl ScopeFilter {
    /// Does `candidate` (already canonical) satisfy this filter?
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            ScopeFilter::Any => true,
            ScopeFilter::Exact(s) => candidate == s.as_str(),
            ScopeFilter::Prefix(s) => is_ancestor(s.as_str(), candidate),
        }
    }
}

/// Parse and validate a raw scope string against the segment rules.
pub fn parse(raw: &str) -> Result<Scope, MnemoError> {
    let normalised: String = raw.nfc().collect();
    let trimmed = normalised.trim_matches('/');

    if trimmed.is_empty() {
        return Err(MnemoError::validation("scope must contain at least one segment"));
    }
    if trimmed.chars().count() > MAX_SCOPE_LEN {
        return Err(MnemoError::validation(format!(
            "scope exceeds {MAX_SCOPE_LEN} code points"
        )));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(MnemoError::validation("scope contains an empty segment"));
        }
        if segment.chars().count() > MAX_SEGMENT_LEN {
            return Err(MnemoError::validation(format!(
                "scope segment '{segment}' exceeds {MAX_SEGMENT_LEN} code points"
            )));
        }
        if segment == "." || segment == ".." {
            return Err(MnemoError::validation(format!(
                "scope segment '{segment}' is reserved"
            )));
        }
        if segment.starts_with('.') {
            return Err(MnemoError::validation(format!(
                "scope segment '{segment}' may not start with '.'"
            )));
        }
        segments.push(segment);
    }

    Ok(Scope(segments.join("/")))
}

/// Canonical string form of a raw scope. Idempotent: `canonical(canonical(s))
/// == canonical(s)`.
pub fn canonical(raw: &str) -> Result<String, MnemoError> {
    Ok(parse(raw)?.into_string())
}

/// `child_of(p, q) ≡ q == p || q.starts_with(p + "/")`, named `is_ancestor(a, b)` to match
/// is `a` an ancestor-or-equal of `b`?
pub fn is_ancestor(a: &str, b: &str) -> bool {
    b == a || b.starts_with(&format!("{a}/"))
}

/// Build a [`ScopeFilter::Prefix`] from a raw scope string.
pub fn expand(raw: &str) -> Result<ScopeFilter, MnemoError> {
    Ok(ScopeFilter::Prefix(parse(raw)?))
}
