//! Fuzz target for feed application.
//!
//! Arbitrary JSON is decoded as a feed batch and applied to a fresh engine.
//! Malformed events must be rejected rather than panic, and every issue left
//! behind must describe a group that really is in conflict.

#![no_main]

use inferadb_issues_detector::ConflictEngine;
use inferadb_issues_types::{FeedMessage, config::DetectorConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(messages) = serde_json::from_slice::<Vec<FeedMessage>>(data) else {
        return;
    };

    let engine = ConflictEngine::new(&DetectorConfig::default());
    for message in &messages {
        if let FeedMessage::Change(event) = message {
            let _ = engine.apply(event);
        }
    }

    for issue in engine.lifecycle().active_issues(engine.index()) {
        let conflict = issue.as_name_conflict().expect("only name conflicts exist");
        assert!(conflict.contestants.len() >= 2, "issue with fewer than two contestants");
    }
});
