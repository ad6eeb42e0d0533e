//! Name-equivalence classification.
//!
//! A classifier maps a display name to the [`ConflictKey`] under which it is
//! compared with other names of the same kind. It is the single point of
//! policy for "what counts as the same name": swapping the classifier changes
//! conflict detection everywhere, including the name filter of issue queries.
//!
//! Classifiers are pure, deterministic, and total. Every input string,
//! including the empty string, maps to a key.

use std::sync::Arc;

use inferadb_issues_types::{
    ConflictKey, EntityKind,
    config::{ClassifierConfig, ClassifierPolicy},
};

/// Maps display names to canonical conflict keys.
pub trait NameClassifier: Send + Sync {
    /// Returns the canonical key for `display_name`.
    fn classify(&self, display_name: &str, kind: EntityKind) -> ConflictKey;

    /// Short policy name used in logs.
    fn policy_name(&self) -> &'static str {
        "custom"
    }
}

impl<F> NameClassifier for F
where
    F: Fn(&str, EntityKind) -> ConflictKey + Send + Sync,
{
    fn classify(&self, display_name: &str, kind: EntityKind) -> ConflictKey {
        self(display_name, kind)
    }
}

/// Names are equal after full Unicode case folding.
///
/// Folding round-trips through both cases so that multi-character mappings
/// line up: `"straße"`, `"STRASSE"`, `"Strasse"` and `"STRAẞE"` share a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitive {
    collapse_whitespace: bool,
}

impl CaseInsensitive {
    /// Creates the classifier.
    pub const fn new(collapse_whitespace: bool) -> Self {
        Self { collapse_whitespace }
    }
}

impl NameClassifier for CaseInsensitive {
    fn classify(&self, display_name: &str, _kind: EntityKind) -> ConflictKey {
        let name = whitespace(display_name, self.collapse_whitespace);
        ConflictKey::new(name.to_lowercase().to_uppercase().to_lowercase())
    }

    fn policy_name(&self) -> &'static str {
        "case_insensitive"
    }
}

/// Names are equal only when identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseSensitive {
    collapse_whitespace: bool,
}

impl CaseSensitive {
    /// Creates the classifier.
    pub const fn new(collapse_whitespace: bool) -> Self {
        Self { collapse_whitespace }
    }
}

impl NameClassifier for CaseSensitive {
    fn classify(&self, display_name: &str, _kind: EntityKind) -> ConflictKey {
        ConflictKey::new(whitespace(display_name, self.collapse_whitespace))
    }

    fn policy_name(&self) -> &'static str {
        "case_sensitive"
    }
}

/// Builds the classifier selected by configuration.
pub fn from_config(config: &ClassifierConfig) -> Arc<dyn NameClassifier> {
    match config.policy {
        ClassifierPolicy::CaseInsensitive => {
            Arc::new(CaseInsensitive::new(config.collapse_whitespace))
        },
        ClassifierPolicy::CaseSensitive => Arc::new(CaseSensitive::new(config.collapse_whitespace)),
    }
}

fn whitespace(name: &str, collapse: bool) -> String {
    if collapse { name.split_whitespace().collect::<Vec<_>>().join(" ") } else { name.to_string() }
}
