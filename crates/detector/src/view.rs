//! Metadata view: the detector's local mirror of named cluster entities.
//!
//! The view is fed only by the detector's apply path. Each slot remembers the
//! commit index of the last change applied to its entity, and deleted
//! entities leave a tombstone behind, so redelivered or stale events are
//! recognised and dropped instead of being applied twice.
//!
//! Applying an event runs the caller's re-index step while the entity's slot
//! is still locked. The view and the conflict index therefore never disagree
//! about an entity for longer than one event.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};
use inferadb_issues_types::{ChangeEvent, ChangeKind, ConflictKey, Entity, EntityId, EntityKind};
use snafu::{Snafu, ensure};
use tokio::sync::broadcast;

use crate::{
    classifier::NameClassifier,
    index::{BucketKey, Member, MembershipChange},
};

// ============================================================================
// Errors
// ============================================================================

/// Why a change event was not applied.
///
/// None of these are fatal: the event is logged, counted, and skipped.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EventError {
    /// The entity already reflects this or a later change.
    #[snafu(display(
        "stale event for entity {entity_id}: log index {log_index} <= last applied {applied}"
    ))]
    Stale {
        /// Entity the event refers to.
        entity_id: EntityId,
        /// Index carried by the event.
        log_index: u64,
        /// Index of the last change applied to the entity.
        applied: u64,
    },

    /// Rename or delete of an entity the view has never seen (or already deleted).
    #[snafu(display("{event} of unknown entity {entity_id}"))]
    UnknownEntity {
        /// Entity the event refers to.
        entity_id: EntityId,
        /// The change that was attempted.
        event: ChangeKind,
    },

    /// Create of an entity that is already live.
    #[snafu(display("entity {entity_id} already exists"))]
    AlreadyExists {
        /// Entity the event refers to.
        entity_id: EntityId,
    },

    /// Create or rename without a display name.
    #[snafu(display("{event} event for entity {entity_id} carries no display name"))]
    MissingDisplayName {
        /// Entity the event refers to.
        entity_id: EntityId,
        /// The change that was attempted.
        event: ChangeKind,
    },

    /// Event kind disagrees with the kind recorded for the entity.
    #[snafu(display("entity {entity_id} is a {expected}, event says {actual}"))]
    KindMismatch {
        /// Entity the event refers to.
        entity_id: EntityId,
        /// Kind on record.
        expected: EntityKind,
        /// Kind carried by the event.
        actual: EntityKind,
    },
}

impl EventError {
    /// Metric label for the skip reason.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Stale { .. } => "stale",
            Self::UnknownEntity { .. } => "unknown_entity",
            Self::AlreadyExists { .. } => "already_exists",
            Self::MissingDisplayName { .. } => "missing_display_name",
            Self::KindMismatch { .. } => "kind_mismatch",
        }
    }

    /// Whether the skip is expected under at-least-once delivery.
    pub const fn is_redelivery(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

// ============================================================================
// Change notifications
// ============================================================================

/// An applied change, as seen by view subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewChange {
    /// A new entity (or one re-created after deletion).
    Created {
        /// The entity as created.
        entity: Entity,
    },
    /// An entity's display name changed.
    Renamed {
        /// The entity with its new name.
        entity: Entity,
        /// The name it had before.
        old_name: String,
    },
    /// An entity was removed.
    Deleted {
        /// The entity as it was before removal.
        entity: Entity,
    },
}

impl ViewChange {
    /// The entity the change applies to.
    pub fn entity(&self) -> &Entity {
        match self {
            Self::Created { entity } | Self::Renamed { entity, .. } | Self::Deleted { entity } => {
                entity
            },
        }
    }
}

/// A change together with the commit index it was applied at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewUpdate {
    /// What changed.
    pub change: ViewChange,
    /// Commit index of the change.
    pub log_index: u64,
}

// ============================================================================
// View
// ============================================================================

#[derive(Debug, Clone)]
struct LiveEntity {
    entity: Entity,
    key: ConflictKey,
}

#[derive(Debug)]
struct Slot {
    kind: EntityKind,
    /// Index of the last applied change, including deletion.
    log_index: u64,
    /// `None` is a tombstone.
    live: Option<LiveEntity>,
}

/// Eventually consistent snapshot of named entities, keyed by id.
///
/// Tombstones are kept for the life of the view so a redelivered change to a
/// deleted entity is still recognised as stale. Memory therefore grows with
/// the number of distinct entities ever seen, not only the live ones;
/// [`len`](Self::len) counts live entities only and does not scan.
#[derive(Debug)]
pub struct MetadataView {
    entities: DashMap<EntityId, Slot>,
    live: AtomicUsize,
    changes: broadcast::Sender<ViewUpdate>,
}

impl MetadataView {
    /// Creates an empty view whose change broadcast buffers `capacity` updates.
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self { entities: DashMap::new(), live: AtomicUsize::new(0), changes }
    }

    /// Live entities of `kind`, ordered by id.
    pub fn current_entities(&self, kind: EntityKind) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .entities
            .iter()
            .filter(|slot| slot.kind == kind)
            .filter_map(|slot| slot.live.as_ref().map(|live| live.entity.clone()))
            .collect();
        entities.sort_by_key(|entity| entity.id);
        entities
    }

    /// A live entity by id.
    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.entities.get(id).and_then(|slot| slot.live.as_ref().map(|live| live.entity.clone()))
    }

    /// Commit index of the last change applied to `id`, live or deleted.
    pub fn last_applied(&self, id: &EntityId) -> Option<u64> {
        self.entities.get(id).map(|slot| slot.log_index)
    }

    /// Bucket `id` currently sits in, if it is live.
    pub(crate) fn current_bucket(&self, id: &EntityId) -> Option<BucketKey> {
        self.entities.get(id).and_then(|slot| {
            slot.live.as_ref().map(|live| BucketKey::new(slot.kind, live.key.clone()))
        })
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Number of slots held, tombstones included.
    pub fn slots(&self) -> usize {
        self.entities.len()
    }

    /// Whether the view holds no live entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to applied changes.
    ///
    /// A subscriber that falls more than the configured capacity behind gets
    /// `RecvError::Lagged(n)` and resumes with the oldest retained change.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.changes.subscribe()
    }

    /// Applies one change event.
    ///
    /// `reindex` receives the resulting bucket membership change and runs
    /// while the entity's slot is locked; its result is passed back.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] (and changes nothing) if the event is stale,
    /// refers to an unknown entity, re-creates a live one, lacks a required
    /// display name, or disagrees with the recorded kind.
    pub(crate) fn apply<R>(
        &self,
        event: &ChangeEvent,
        classifier: &dyn NameClassifier,
        reindex: impl FnOnce(&MembershipChange) -> R,
    ) -> Result<(ViewUpdate, R), EventError> {
        let entity_id = event.entity_id;
        let (change, result) = match self.entities.entry(entity_id) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                ensure!(
                    event.log_index > slot.log_index,
                    StaleSnafu { entity_id, log_index: event.log_index, applied: slot.log_index }
                );
                ensure!(
                    slot.kind == event.kind,
                    KindMismatchSnafu { entity_id, expected: slot.kind, actual: event.kind }
                );
                let (next, change) = next_state(event, slot.live.as_ref(), classifier)?;
                let result = reindex(&membership(event, slot.live.as_ref(), next.as_ref()));
                match (slot.live.is_some(), next.is_some()) {
                    (false, true) => {
                        self.live.fetch_add(1, Ordering::AcqRel);
                    },
                    (true, false) => {
                        self.live.fetch_sub(1, Ordering::AcqRel);
                    },
                    _ => {},
                }
                slot.live = next;
                slot.log_index = event.log_index;
                (change, result)
            },
            Entry::Vacant(vacant) => {
                let (next, change) = next_state(event, None, classifier)?;
                let result = reindex(&membership(event, None, next.as_ref()));
                if next.is_some() {
                    self.live.fetch_add(1, Ordering::AcqRel);
                }
                vacant.insert(Slot { kind: event.kind, log_index: event.log_index, live: next });
                (change, result)
            },
        };

        let update = ViewUpdate { change, log_index: event.log_index };
        // No receivers is fine.
        let _ = self.changes.send(update.clone());
        Ok((update, result))
    }
}

fn next_state(
    event: &ChangeEvent,
    current: Option<&LiveEntity>,
    classifier: &dyn NameClassifier,
) -> Result<(Option<LiveEntity>, ViewChange), EventError> {
    let entity_id = event.entity_id;
    match (event.event, current) {
        (ChangeKind::Created, Some(_)) => AlreadyExistsSnafu { entity_id }.fail(),
        (ChangeKind::Created, None) => {
            let entity = Entity::new(entity_id, event.kind, required_name(event)?);
            let key = classifier.classify(&entity.display_name, entity.kind);
            Ok((Some(LiveEntity { entity: entity.clone(), key }), ViewChange::Created { entity }))
        },
        (ChangeKind::Renamed, Some(live)) => {
            let mut entity = live.entity.clone();
            let old_name = std::mem::replace(&mut entity.display_name, required_name(event)?);
            let key = classifier.classify(&entity.display_name, entity.kind);
            Ok((Some(LiveEntity { entity: entity.clone(), key }), ViewChange::Renamed {
                entity,
                old_name,
            }))
        },
        (ChangeKind::Deleted, Some(live)) => {
            Ok((None, ViewChange::Deleted { entity: live.entity.clone() }))
        },
        (ChangeKind::Renamed | ChangeKind::Deleted, None) => {
            UnknownEntitySnafu { entity_id, event: event.event }.fail()
        },
    }
}

fn required_name(event: &ChangeEvent) -> Result<String, EventError> {
    match &event.display_name {
        Some(name) => Ok(name.clone()),
        None => MissingDisplayNameSnafu { entity_id: event.entity_id, event: event.event }.fail(),
    }
}

fn membership(
    event: &ChangeEvent,
    before: Option<&LiveEntity>,
    after: Option<&LiveEntity>,
) -> MembershipChange {
    MembershipChange {
        entity_id: event.entity_id,
        kind: event.kind,
        from: before.map(|live| live.key.clone()),
        to: after.map(|live| {
            (live.key.clone(), Member {
                display_name: live.entity.display_name.clone(),
                log_index: event.log_index,
            })
        }),
    }
}
