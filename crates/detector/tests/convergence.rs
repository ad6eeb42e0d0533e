//! Convergence property: whatever order and duplication the feed delivers,
//! the detector's issues equal the conflicts computed from scratch over the
//! final entity set.

// Test code is allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use inferadb_issues_detector::{
    CaseInsensitive, ConflictEngine, Detector, DetectorPhase, NameClassifier,
};
use inferadb_issues_test_utils::{assert_eventually, strategies, test_detector_config};
use inferadb_issues_types::{
    ChangeEvent, ChangeKind, ConflictKey, EntityId, EntityKind, FeedMessage, Issue, IssueFilter,
    config::DetectorConfig,
};
use proptest::prelude::*;

/// Reference model: applies the feed sequentially with the same validity
/// rules, then groups by key from scratch.
#[derive(Default)]
struct Model {
    /// id → (kind, live name, last applied index)
    entities: HashMap<EntityId, (EntityKind, Option<String>, u64)>,
}

impl Model {
    fn apply(&mut self, event: &ChangeEvent) {
        let current = self.entities.get(&event.entity_id).cloned();
        if let Some((kind, _, last)) = &current {
            if event.log_index <= *last || *kind != event.kind {
                return;
            }
        }
        let live = current.as_ref().and_then(|(_, name, _)| name.clone());
        let next = match (event.event, live) {
            (ChangeKind::Created, None) | (ChangeKind::Renamed, Some(_)) => {
                match &event.display_name {
                    Some(name) => Some(name.clone()),
                    None => return,
                }
            },
            (ChangeKind::Deleted, Some(_)) => None,
            _ => return,
        };
        self.entities.insert(event.entity_id, (event.kind, next, event.log_index));
    }

    /// `(kind, key)` → (contestants, representative name).
    fn conflicts(
        &self,
        classifier: &dyn NameClassifier,
    ) -> BTreeMap<(EntityKind, ConflictKey), (BTreeSet<EntityId>, String)> {
        let mut groups: BTreeMap<(EntityKind, ConflictKey), Vec<(u64, EntityId, String)>> =
            BTreeMap::new();
        for (id, (kind, name, index)) in &self.entities {
            if let Some(name) = name {
                groups
                    .entry((*kind, classifier.classify(name, *kind)))
                    .or_default()
                    .push((*index, *id, name.clone()));
            }
        }
        groups
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(key, members)| {
                let representative =
                    members.iter().max_by_key(|(index, id, _)| (*index, *id)).unwrap().2.clone();
                let ids = members.iter().map(|(_, id, _)| *id).collect();
                (key, (ids, representative))
            })
            .collect()
    }
}

type ConflictSummary = (EntityKind, BTreeSet<EntityId>, String);

fn conflict_set(issues: &[Issue]) -> BTreeSet<ConflictSummary> {
    issues
        .iter()
        .filter_map(|issue| issue.as_name_conflict())
        .map(|c| (c.object_type, c.contestants.clone(), c.contested_name.clone()))
        .collect()
}

fn expected(events: &[ChangeEvent]) -> BTreeSet<ConflictSummary> {
    let mut model = Model::default();
    for event in events {
        model.apply(event);
    }
    model
        .conflicts(&CaseInsensitive::default())
        .into_iter()
        .map(|((kind, _), (ids, name))| (kind, ids, name))
        .collect()
}

fn observed_engine(engine: &ConflictEngine) -> BTreeSet<ConflictSummary> {
    conflict_set(&engine.lifecycle().active_issues(engine.index()))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Synchronous core, events in feed order.
    #[test]
    fn prop_engine_matches_model(events in strategies::arb_change_events(64)) {
        let engine = ConflictEngine::new(&DetectorConfig::default());
        for event in &events {
            let _ = engine.apply(event);
        }
        prop_assert_eq!(observed_engine(&engine), expected(&events));

        // Replaying the whole feed changes nothing.
        let before = engine.lifecycle().active_issues(engine.index());
        for event in &events {
            let _ = engine.apply(event);
        }
        prop_assert_eq!(engine.lifecycle().active_issues(engine.index()), before);
    }

    /// Issue payloads always agree with the index they were derived from.
    #[test]
    fn prop_issues_match_groups(events in strategies::arb_change_events(64)) {
        let engine = ConflictEngine::new(&DetectorConfig::default());
        for event in &events {
            let _ = engine.apply(event);
        }
        let issues = engine.lifecycle().active_issues(engine.index());
        let mut groups = 0;
        for kind in EntityKind::ALL {
            for group in engine.index().groups_with_conflict(kind) {
                groups += 1;
                let issue = issues
                    .iter()
                    .filter_map(|issue| issue.as_name_conflict())
                    .find(|c| c.object_type == kind && c.contestants == group.members);
                prop_assert!(issue.is_some(), "group {:?} has no matching issue", group);
            }
        }
        prop_assert_eq!(groups, issues.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Full async pipeline with concurrent workers.
    #[test]
    fn prop_detector_matches_model(events in strategies::arb_change_events(48)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(3)
            .enable_all()
            .build()
            .unwrap();
        let (observed, resolved) = runtime.block_on(async {
            let detector = Detector::spawn(test_detector_config()).unwrap();
            let highest = events.iter().map(|event| event.log_index).max().unwrap_or(0);
            let mut messages: Vec<FeedMessage> = events.iter().cloned().map(FeedMessage::from).collect();
            messages.push(FeedMessage::CaughtUp { log_index: highest });
            detector.feed().send_all(messages).await.unwrap();
            detector.wait_for_index(highest, Some(Duration::from_secs(10))).await.unwrap();
            let ready = assert_eventually(Duration::from_secs(10), || {
                detector.phase() == DetectorPhase::Ready
            })
            .await;
            assert!(ready);

            let issues = detector.query().list_issues(&IssueFilter::all()).unwrap();
            let resolved = detector.query().resolved_issues(usize::MAX).unwrap();
            detector.shutdown().await;
            (
                conflict_set(&issues),
                resolution_log(resolved.into_iter().map(|resolved| resolved.issue)),
            )
        });
        prop_assert_eq!(observed, expected(&events));

        // Same resolutions as one thread applying the feed in order: a
        // conflict that never lapsed is never resolved.
        let engine = ConflictEngine::new(&test_detector_config());
        for event in &events {
            let _ = engine.apply(event);
        }
        let sequential = engine.lifecycle().resolved(usize::MAX);
        prop_assert_eq!(
            resolved,
            resolution_log(sequential.into_iter().map(|resolved| resolved.issue))
        );
    }
}

/// Resolved conflicts as a sorted multiset.
fn resolution_log(issues: impl Iterator<Item = Issue>) -> Vec<ConflictSummary> {
    let mut log: Vec<ConflictSummary> = issues
        .filter_map(|issue| {
            issue
                .as_name_conflict()
                .map(|c| (c.object_type, c.contestants.clone(), c.contested_name.clone()))
        })
        .collect();
    log.sort();
    log
}

#[test]
fn test_custom_classifier_drives_the_model_too() {
    let first_letter: Arc<dyn NameClassifier> = Arc::new(|name: &str, _kind: EntityKind| {
        ConflictKey::new(name.chars().next().map(String::from).unwrap_or_default())
    });
    let engine = ConflictEngine::with_classifier(&DetectorConfig::default(), Arc::clone(&first_letter));
    let (a, b) = (EntityId::random(), EntityId::random());
    engine.apply(&ChangeEvent::created(a, EntityKind::Namespace, "apple", 1)).unwrap();
    engine.apply(&ChangeEvent::created(b, EntityKind::Namespace, "avocado", 2)).unwrap();

    let mut model = Model::default();
    model.apply(&ChangeEvent::created(a, EntityKind::Namespace, "apple", 1));
    model.apply(&ChangeEvent::created(b, EntityKind::Namespace, "avocado", 2));
    let conflicts = model.conflicts(first_letter.as_ref());

    assert_eq!(conflicts.len(), 1);
    assert_eq!(engine.lifecycle().active_count(), 1);
    let (ids, name) = conflicts.values().next().unwrap();
    assert_eq!(ids, &[a, b].into_iter().collect());
    assert_eq!(name, "avocado");
}
