//! Issue lifecycle: turns bucket membership into issue records.
//!
//! Per `(kind, key)` bucket the manager runs a two-state machine:
//!
//! ```text
//!              members ≥ 2                      members ≥ 2, payload changed
//!   Absent ───────────────────▶ Active ◀──────────────────────────────────┐
//!     ▲                           │  └────────────────────────────────────┘
//!     └───────────────────────────┘
//!              members ≤ 1
//! ```
//!
//! [`IssueLifecycle::reconcile`] is called with the bucket still locked,
//! right after its membership changed, and is the only code that creates,
//! refreshes, or resolves issues. A conflict keeps its `IssueId` for as long
//! as it stays active; once resolved, a re-formed conflict gets a new id.

use std::collections::{BTreeSet, VecDeque};

use chrono::Utc;
use dashmap::DashMap;
use inferadb_issues_types::{
    Issue, IssueDetails, IssueId, NameConflict, ResolvedIssue,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    index::{Bucket, BucketKey, ConflictIndex},
    metrics,
};

/// Outcome of reconciling one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Bucket was not and is not in conflict, or its issue payload is unchanged.
    Unchanged,
    /// Absent → Active.
    Created(IssueId),
    /// Active → Active with a refreshed payload.
    Updated(IssueId),
    /// Active → Absent.
    Resolved(IssueId),
}

impl Transition {
    /// Metric label for the transition.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Resolved(_) => "resolved",
        }
    }
}

/// Sole writer of issue state.
#[derive(Debug)]
pub struct IssueLifecycle {
    /// Active issue id → bucket holding it.
    active: DashMap<IssueId, BucketKey>,
    /// Most recently resolved issues, newest first.
    history: Mutex<VecDeque<ResolvedIssue>>,
    history_capacity: usize,
}

impl IssueLifecycle {
    /// Creates a lifecycle manager keeping up to `history_capacity` resolved issues.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            active: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(history_capacity.min(1024))),
            history_capacity,
        }
    }

    /// Brings `bucket.issue` in line with `bucket`'s membership.
    ///
    /// Must be called while the bucket is locked, after every membership
    /// change.
    pub(crate) fn reconcile(&self, bucket_key: &BucketKey, bucket: &mut Bucket) -> Transition {
        let now = Utc::now();
        let payload = bucket_payload(bucket_key, bucket);
        let contestants = bucket.len();
        let transition = match (bucket.issue.as_mut(), payload) {
            (None, None) => Transition::Unchanged,
            (None, Some(details)) => {
                let id = IssueId::random();
                bucket.issue = Some(Issue::new(id, details, now));
                self.active.insert(id, bucket_key.clone());
                info!(
                    issue_id = %id,
                    kind = %bucket_key.kind,
                    key = %bucket_key.key,
                    contestants,
                    "Name conflict detected"
                );
                Transition::Created(id)
            },
            (Some(issue), Some(details)) => {
                if issue.details == details {
                    Transition::Unchanged
                } else {
                    issue.refresh(details, now);
                    debug!(
                        issue_id = %issue.id,
                        kind = %bucket_key.kind,
                        contestants,
                        "Name conflict updated"
                    );
                    Transition::Updated(issue.id)
                }
            },
            (Some(_), None) => match bucket.issue.take() {
                Some(issue) => {
                    let id = issue.id;
                    self.active.remove(&id);
                    info!(
                        issue_id = %id,
                        kind = %bucket_key.kind,
                        key = %bucket_key.key,
                        "Name conflict resolved"
                    );
                    self.archive(ResolvedIssue { issue, resolved_at: now });
                    Transition::Resolved(id)
                },
                None => Transition::Unchanged,
            },
        };

        if transition != Transition::Unchanged {
            metrics::record_issue_transition(bucket_key.kind, transition);
            metrics::set_active_issues(self.active.len());
        }
        transition
    }

    /// Snapshot of every active issue.
    ///
    /// Each issue is read under its bucket's lock, so it is internally
    /// consistent; no bucket contributes more than one issue.
    pub fn active_issues(&self, index: &ConflictIndex) -> Vec<Issue> {
        let keys: BTreeSet<BucketKey> =
            self.active.iter().map(|entry| entry.value().clone()).collect();
        keys.iter().filter_map(|key| index.issue_for(key, None)).collect()
    }

    /// Looks up an active issue by id.
    pub fn find(&self, index: &ConflictIndex, id: IssueId) -> Option<Issue> {
        let key = self.active.get(&id).map(|entry| entry.value().clone())?;
        index.issue_for(&key, Some(id))
    }

    /// Number of active issues.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Up to `limit` most recently resolved issues, newest first.
    pub fn resolved(&self, limit: usize) -> Vec<ResolvedIssue> {
        self.history.lock().iter().take(limit).cloned().collect()
    }

    fn archive(&self, resolved: ResolvedIssue) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        history.push_front(resolved);
        history.truncate(self.history_capacity);
    }
}

/// Issue payload a bucket should carry, or `None` if it is not in conflict.
fn bucket_payload(bucket_key: &BucketKey, bucket: &Bucket) -> Option<IssueDetails> {
    if !bucket.in_conflict() {
        return None;
    }
    let (_, representative) = bucket.representative()?;
    Some(IssueDetails::NameConflict(NameConflict {
        object_type: bucket_key.kind,
        contested_name: representative.display_name.clone(),
        contestants: bucket.member_ids(),
    }))
}
