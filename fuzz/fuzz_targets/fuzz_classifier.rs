//! Fuzz target for name classification.
//!
//! Every string, including empty and invalid-then-repaired UTF-8, must map to
//! a key without panicking, and the same input must always map to the same
//! key.

#![no_main]

use inferadb_issues_detector::{CaseInsensitive, CaseSensitive, NameClassifier};
use inferadb_issues_types::EntityKind;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let name = String::from_utf8_lossy(data);
    let kind = EntityKind::ALL[data.first().map_or(0, |b| *b as usize) % EntityKind::ALL.len()];

    for collapse in [false, true] {
        let insensitive = CaseInsensitive::new(collapse);
        let sensitive = CaseSensitive::new(collapse);

        let key = insensitive.classify(&name, kind);
        assert_eq!(key, insensitive.classify(&name, kind), "classification must be deterministic");

        let exact = sensitive.classify(&name, kind);
        if collapse {
            let text = exact.as_str();
            assert_eq!(text, text.trim(), "collapsed key keeps outer whitespace");
            assert!(!text.contains("  "), "collapsed key keeps a whitespace run");
        } else {
            assert_eq!(exact.as_str(), name.as_ref(), "case-sensitive key must be the name itself");
        }
    }
});
