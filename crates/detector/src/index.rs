//! Conflict index: live entities grouped by `(kind, conflict key)`.
//!
//! Each bucket holds the members currently sharing a canonical name together
//! with the issue (if any) describing that bucket. Keeping both in one value
//! means a single shard lock covers a membership change and the issue
//! transition it causes, so readers never see contestants that disagree with
//! the group.
//!
//! # Layout
//!
//! ```text
//! DashMap<BucketKey, Bucket>
//!   (namespace, "users") → { members: {a → "Users"@12, b → "USERS"@15}, issue: Some(..) }
//!   (server,    "node1") → { members: {c → "node1"@3},                   issue: None      }
//! ```
//!
//! Updates touch only the affected bucket. Buckets on different shards are
//! updated concurrently; empty buckets are removed.

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use inferadb_issues_types::{ConflictKey, EntityId, EntityKind, Issue, IssueId};

/// Partition key of the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    /// Entity kind; names only conflict within a kind.
    pub kind: EntityKind,
    /// Canonical name.
    pub key: ConflictKey,
}

impl BucketKey {
    /// Creates a bucket key.
    pub fn new(kind: EntityKind, key: ConflictKey) -> Self {
        Self { kind, key }
    }
}

/// A bucket member's current name and the commit index it was observed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Raw display name.
    pub display_name: String,
    /// Commit index of the change that gave the member this name.
    pub log_index: u64,
}

/// Members sharing a canonical name, plus the issue describing them.
#[derive(Debug, Default)]
pub struct Bucket {
    members: BTreeMap<EntityId, Member>,
    pub(crate) issue: Option<Issue>,
}

impl Bucket {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the bucket has no members and no issue.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.issue.is_none()
    }

    /// Whether the bucket currently holds a conflict.
    pub fn in_conflict(&self) -> bool {
        self.members.len() >= 2
    }

    /// Member identifiers.
    pub fn member_ids(&self) -> BTreeSet<EntityId> {
        self.members.keys().copied().collect()
    }

    /// The member whose name was observed most recently.
    ///
    /// Chosen by highest commit index (ties broken by id), so the result
    /// does not depend on the order in which workers applied events.
    pub fn representative(&self) -> Option<(&EntityId, &Member)> {
        self.members.iter().max_by(|(a_id, a), (b_id, b)| {
            a.log_index.cmp(&b.log_index).then_with(|| a_id.cmp(b_id))
        })
    }

    /// The issue describing this bucket, if any.
    pub fn issue(&self) -> Option<&Issue> {
        self.issue.as_ref()
    }

    pub(crate) fn join(&mut self, id: EntityId, member: Member) {
        self.members.insert(id, member);
    }

    pub(crate) fn leave(&mut self, id: &EntityId) -> Option<Member> {
        self.members.remove(id)
    }
}

/// Transient view of a bucket in conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    /// Entity kind.
    pub kind: EntityKind,
    /// Canonical name.
    pub key: ConflictKey,
    /// Contesting entities.
    pub members: BTreeSet<EntityId>,
}

/// How one entity's bucket membership changes as the result of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    /// The entity.
    pub entity_id: EntityId,
    /// Its kind.
    pub kind: EntityKind,
    /// Bucket it leaves, if any.
    pub from: Option<ConflictKey>,
    /// Bucket it joins (or stays in) and its new member record, if any.
    pub to: Option<(ConflictKey, Member)>,
}

impl MembershipChange {
    /// Whether the entity keeps its bucket (a rename that does not change the key).
    pub fn stays_in_place(&self) -> bool {
        matches!((&self.from, &self.to), (Some(old), Some((new, _))) if old == new)
    }
}

/// Partitioned map from `(kind, key)` to bucket.
#[derive(Debug, Default)]
pub struct ConflictIndex {
    buckets: DashMap<BucketKey, Bucket>,
}

impl ConflictIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on the bucket for `(kind, key)` under its shard lock.
    ///
    /// The bucket is created on demand and removed again if `f` leaves it
    /// empty.
    pub(crate) fn update<R>(
        &self,
        kind: EntityKind,
        key: &ConflictKey,
        f: impl FnOnce(&BucketKey, &mut Bucket) -> R,
    ) -> R {
        let bucket_key = BucketKey::new(kind, key.clone());
        let mut bucket = self.buckets.entry(bucket_key.clone()).or_default();
        let result = f(&bucket_key, bucket.value_mut());
        let empty = bucket.is_empty();
        drop(bucket);

        if empty {
            self.buckets.remove_if(&bucket_key, |_, bucket| bucket.is_empty());
        }
        result
    }

    /// All groups of `kind` with two or more members.
    pub fn groups_with_conflict(&self, kind: EntityKind) -> Vec<ConflictGroup> {
        let mut groups: Vec<ConflictGroup> = self
            .buckets
            .iter()
            .filter(|entry| entry.key().kind == kind && entry.value().in_conflict())
            .map(|entry| ConflictGroup {
                kind,
                key: entry.key().key.clone(),
                members: entry.value().member_ids(),
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        groups
    }

    /// The group for `(kind, key)`, regardless of size.
    pub fn group(&self, kind: EntityKind, key: &ConflictKey) -> Option<ConflictGroup> {
        let bucket_key = BucketKey::new(kind, key.clone());
        self.buckets.get(&bucket_key).map(|bucket| ConflictGroup {
            kind,
            key: key.clone(),
            members: bucket.member_ids(),
        })
    }

    /// Current issue of a bucket, if it matches `id` when given.
    pub(crate) fn issue_for(&self, bucket_key: &BucketKey, id: Option<IssueId>) -> Option<Issue> {
        let bucket = self.buckets.get(bucket_key)?;
        let issue = bucket.issue.as_ref()?;
        match id {
            Some(id) if issue.id != id => None,
            _ => Some(issue.clone()),
        }
    }

    /// Number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
