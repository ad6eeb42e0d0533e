//! End-to-end name-conflict scenarios through the async detector.
//!
//! Each test scripts a metadata feed, pushes it through [`Detector`], waits
//! on the applied watermark, and inspects the issue set.

// Test code is allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::time::Duration;

use inferadb_issues_detector::{Detector, DetectorPhase, ViewChange};
use inferadb_issues_test_utils::{FeedScript, assert_eventually, test_detector_config};
use inferadb_issues_types::{
    ChangeEvent, DetectorError, EntityId, EntityKind, FeedMessage, Issue, IssueFilter, IssueType,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

/// Pushes the script's pending messages and waits until they are applied.
async fn feed(detector: &Detector, script: &mut FeedScript) {
    let last = script.last_index();
    detector.feed().send_all(script.take_messages()).await.unwrap();
    detector.wait_for_index(last, WAIT).await.unwrap();
}

/// Starts a detector, replays the script followed by `caught_up`, and waits
/// for it to turn ready.
async fn ready_detector(script: &mut FeedScript) -> Detector {
    let detector = Detector::spawn(test_detector_config()).unwrap();
    script.caught_up();
    feed(&detector, script).await;
    let ready = assert_eventually(Duration::from_secs(10), || {
        detector.phase() == DetectorPhase::Ready
    })
    .await;
    assert!(ready, "detector should be ready after caught_up");
    detector
}

fn issues(detector: &Detector) -> Vec<Issue> {
    detector.query().list_issues(&IssueFilter::all()).unwrap()
}

fn contestants(issue: &Issue) -> Vec<EntityId> {
    issue.as_name_conflict().unwrap().contestants.iter().copied().collect()
}

fn sorted(mut ids: Vec<EntityId>) -> Vec<EntityId> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_two_equal_names_produce_one_issue() {
    let mut script = FeedScript::new();
    let a = script.create(EntityKind::Namespace, "users");
    let b = script.create(EntityKind::Namespace, "users");
    let detector = ready_detector(&mut script).await;

    let issues = issues(&detector);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type(), IssueType::NameConflict);
    assert_eq!(contestants(&issues[0]), sorted(vec![a, b]));
    assert!(!issues[0].critical);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_john_jacob_jingleheimer_schmidt() {
    let name = "John Jacob Jingleheimer Schmidt";
    let mut script = FeedScript::new();
    let n1 = script.create(EntityKind::Namespace, name);
    let n2 = script.create(EntityKind::Namespace, &name.to_uppercase());
    let detector = ready_detector(&mut script).await;

    let issues = issues(&detector);
    assert_eq!(issues.len(), 1);
    let conflict = issues[0].as_name_conflict().unwrap();
    assert_eq!(conflict.contested_name.to_lowercase(), name.to_lowercase());
    assert_eq!(contestants(&issues[0]), sorted(vec![n1, n2]));

    let json = serde_json::to_value(&issues[0]).unwrap();
    assert_eq!(json["type"], "NAME_CONFLICT_ISSUE");
    assert_eq!(json["contestants"].as_array().unwrap().len(), 2);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_three_way_conflict_shrinks_then_resolves() {
    let mut script = FeedScript::new();
    let _n1 = script.create(EntityKind::Namespace, "orders");
    let n2 = script.create(EntityKind::Namespace, "Orders");
    let n3 = script.create(EntityKind::Namespace, "ORDERS");
    let detector = ready_detector(&mut script).await;

    let before = issues(&detector);
    assert_eq!(before.len(), 1);
    assert_eq!(contestants(&before[0]).len(), 3);

    script.delete(n3);
    feed(&detector, &mut script).await;
    let after = issues(&detector);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(contestants(&after[0]).len(), 2);
    assert!(!contestants(&after[0]).contains(&n3));

    script.delete(n2);
    feed(&detector, &mut script).await;
    assert!(issues(&detector).is_empty());

    let resolved = detector.query().resolved_issues(10).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].issue.id, before[0].id);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_rename_away_resolves_immediately() {
    let mut script = FeedScript::new();
    let a = script.create(EntityKind::Server, "node-1");
    let b = script.create(EntityKind::Server, "NODE-1");
    let detector = ready_detector(&mut script).await;
    assert_eq!(issues(&detector).len(), 1);

    script.rename(b, "node-2");
    feed(&detector, &mut script).await;
    assert!(issues(&detector).is_empty());
    assert_eq!(detector.view().get(&a).unwrap().display_name, "node-1");

    detector.shutdown().await;
}

#[tokio::test]
async fn test_distinct_names_produce_no_issues() {
    let mut script = FeedScript::new();
    for name in ["alpha", "beta", "gamma", "alpha ", "alphaa", "straße", "strase"] {
        script.create(EntityKind::Namespace, name);
    }
    let detector = ready_detector(&mut script).await;

    assert!(issues(&detector).is_empty());
    assert_eq!(detector.query().issue_count().unwrap(), 0);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_same_name_across_kinds_never_conflicts() {
    let mut script = FeedScript::new();
    for kind in EntityKind::ALL {
        script.create(kind, "primary");
    }
    let detector = ready_detector(&mut script).await;

    assert!(issues(&detector).is_empty());
    for kind in EntityKind::ALL {
        assert_eq!(detector.view().current_entities(kind).len(), 1);
    }

    detector.shutdown().await;
}

#[tokio::test]
async fn test_case_only_rename_keeps_issue_identity() {
    let mut script = FeedScript::new();
    let a = script.create(EntityKind::Datacenter, "east");
    script.create(EntityKind::Datacenter, "east");
    let detector = ready_detector(&mut script).await;
    let original = issues(&detector).remove(0);

    script.rename(a, "EAST");
    feed(&detector, &mut script).await;

    let refreshed = issues(&detector).remove(0);
    assert_eq!(refreshed.id, original.id);
    assert_eq!(refreshed.first_observed, original.first_observed);
    assert!(refreshed.last_observed >= original.last_observed);
    assert_eq!(refreshed.as_name_conflict().unwrap().contested_name, "EAST");

    detector.shutdown().await;
}

#[tokio::test]
async fn test_delete_and_recreate_gets_new_identity() {
    let mut script = FeedScript::new();
    script.create(EntityKind::Namespace, "logs");
    let b = script.create(EntityKind::Namespace, "logs");
    let detector = ready_detector(&mut script).await;
    let first = issues(&detector).remove(0);

    script.delete(b);
    script.create_with_id(b, EntityKind::Namespace, "Logs");
    feed(&detector, &mut script).await;

    let second = issues(&detector).remove(0);
    assert_ne!(second.id, first.id);
    assert_eq!(contestants(&second), contestants(&first));
    let resolved = detector.query().resolved_issues(1).unwrap();
    assert_eq!(resolved[0].issue.id, first.id);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_replayed_feed_is_idempotent() {
    let mut script = FeedScript::new();
    let a = script.create(EntityKind::Namespace, "users");
    let b = script.create(EntityKind::Namespace, "USERS");
    let c = script.create(EntityKind::Namespace, "Users");
    let d = script.create(EntityKind::Namespace, "users");
    script.rename(c, "orders").delete(d);
    let original: Vec<FeedMessage> = script.messages().to_vec();
    let detector = ready_detector(&mut script).await;
    let before = issues(&detector);
    assert_eq!(before.len(), 1);
    assert_eq!(contestants(&before[0]), sorted(vec![a, b]));

    // Redelivered events carry old indexes; a fresh sentinel event is only
    // covered by the watermark once they have all been applied.
    detector.feed().send_all(original).await.unwrap();
    script.create(EntityKind::Server, "sentinel");
    feed(&detector, &mut script).await;

    assert_eq!(issues(&detector), before);
    assert_eq!(detector.view().get(&c).unwrap().display_name, "orders");
    assert!(detector.view().get(&d).is_none());

    detector.shutdown().await;
}

#[tokio::test]
async fn test_queries_fail_until_caught_up() {
    let detector = Detector::spawn(test_detector_config()).unwrap();
    let mut script = FeedScript::new();
    script.create(EntityKind::Namespace, "users");
    script.create(EntityKind::Namespace, "users");
    feed(&detector, &mut script).await;

    assert!(matches!(detector.query().list_issues(&IssueFilter::all()), Err(DetectorError::NotReady)));
    assert!(detector.query().list_issues(&IssueFilter::all()).unwrap_err().is_retryable());

    script.caught_up();
    feed(&detector, &mut script).await;
    let ready =
        assert_eventually(Duration::from_secs(10), || detector.phase() == DetectorPhase::Ready)
            .await;
    assert!(ready);
    assert_eq!(issues(&detector).len(), 1);

    detector.shutdown().await;
    assert!(matches!(
        detector.query().list_issues(&IssueFilter::all()),
        Err(DetectorError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_malformed_events_are_skipped() {
    let mut script = FeedScript::new();
    let a = script.create(EntityKind::Namespace, "users");
    let detector = ready_detector(&mut script).await;

    let ghost = EntityId::random();
    let mut nameless = ChangeEvent::created(EntityId::random(), EntityKind::Namespace, "x", 100);
    nameless.display_name = None;
    let feed_tx = detector.feed();
    feed_tx.send(ChangeEvent::renamed(ghost, EntityKind::Namespace, "users", 101)).await.unwrap();
    feed_tx.send(nameless).await.unwrap();
    feed_tx.send(ChangeEvent::renamed(a, EntityKind::Server, "users", 102)).await.unwrap();
    feed_tx.send(ChangeEvent::created(a, EntityKind::Namespace, "users", 103)).await.unwrap();
    detector.wait_for_index(103, WAIT).await.unwrap();

    assert!(issues(&detector).is_empty());
    assert_eq!(detector.view().len(), 1);
    assert_eq!(detector.view().last_applied(&a), Some(1));

    detector.shutdown().await;
}

#[tokio::test]
async fn test_filter_by_object_type_and_name() {
    let mut script = FeedScript::new();
    script.create(EntityKind::Namespace, "shared");
    script.create(EntityKind::Namespace, "SHARED");
    script.create(EntityKind::Server, "worker");
    script.create(EntityKind::Server, "Worker");
    let detector = ready_detector(&mut script).await;
    let query = detector.query();

    assert_eq!(issues(&detector).len(), 2);
    let servers = query.list_issues(&IssueFilter::all().with_object_type(EntityKind::Server)).unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].as_name_conflict().unwrap().object_type, EntityKind::Server);

    let named = query.list_issues(&IssueFilter::all().with_name("Shared")).unwrap();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].as_name_conflict().unwrap().object_type, EntityKind::Namespace);

    let fetched = query.get_issue(named[0].id).unwrap();
    assert_eq!(fetched, named[0]);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_view_subscribers_observe_changes() {
    let detector = Detector::spawn(test_detector_config()).unwrap();
    let mut changes = detector.view().subscribe();

    let mut script = FeedScript::new();
    let a = script.create(EntityKind::Namespace, "first");
    script.rename(a, "second");
    feed(&detector, &mut script).await;

    let created = changes.recv().await.unwrap();
    assert!(matches!(created.change, ViewChange::Created { .. }));
    let renamed = changes.recv().await.unwrap();
    match renamed.change {
        ViewChange::Renamed { entity, old_name } => {
            assert_eq!(old_name, "first");
            assert_eq!(entity.display_name, "second");
        },
        other => panic!("unexpected change: {other:?}"),
    }

    detector.shutdown().await;
}
