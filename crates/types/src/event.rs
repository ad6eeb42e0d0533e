//! Inbound change-feed records from the replicated metadata layer.
//!
//! The metadata layer emits one [`ChangeEvent`] per committed create, rename,
//! or delete of a named entity. Events are delivered at least once, in causal
//! order per entity. Every event carries the metadata layer's commit index
//! (`log_index`), which is strictly increasing per entity and monotonic across
//! the whole feed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EntityId, EntityKind};

/// What happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The entity was created with an initial display name.
    Created,
    /// The entity's display name changed.
    Renamed,
    /// The entity was removed.
    Deleted,
}

impl ChangeKind {
    /// Returns the wire name of the change.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Renamed => "renamed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entity change as committed by the metadata layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Entity the change applies to.
    pub entity_id: EntityId,
    /// Kind of the entity.
    pub kind: EntityKind,
    /// The change itself.
    pub event: ChangeKind,
    /// New display name. Required for `created` and `renamed`, ignored for `deleted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Commit index of the change in the metadata log.
    pub log_index: u64,
}

impl ChangeEvent {
    /// Builds a `created` event.
    pub fn created(
        entity_id: EntityId,
        kind: EntityKind,
        display_name: impl Into<String>,
        log_index: u64,
    ) -> Self {
        Self {
            entity_id,
            kind,
            event: ChangeKind::Created,
            display_name: Some(display_name.into()),
            log_index,
        }
    }

    /// Builds a `renamed` event.
    pub fn renamed(
        entity_id: EntityId,
        kind: EntityKind,
        display_name: impl Into<String>,
        log_index: u64,
    ) -> Self {
        Self {
            entity_id,
            kind,
            event: ChangeKind::Renamed,
            display_name: Some(display_name.into()),
            log_index,
        }
    }

    /// Builds a `deleted` event.
    pub fn deleted(entity_id: EntityId, kind: EntityKind, log_index: u64) -> Self {
        Self { entity_id, kind, event: ChangeKind::Deleted, display_name: None, log_index }
    }
}

/// One message on the inbound feed.
///
/// Besides entity changes, the metadata layer announces when its initial
/// replay has been delivered; until then the detector's view is incomplete
/// and queries report "not ready".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// An entity change.
    Change(ChangeEvent),
    /// Initial replay is complete through `log_index`.
    CaughtUp {
        /// Last commit index included in the replay.
        log_index: u64,
    },
}

impl From<ChangeEvent> for FeedMessage {
    fn from(event: ChangeEvent) -> Self {
        Self::Change(event)
    }
}

impl FeedMessage {
    /// Commit index carried by the message.
    #[must_use]
    pub fn log_index(&self) -> u64 {
        match self {
            Self::Change(event) => event.log_index,
            Self::CaughtUp { log_index } => *log_index,
        }
    }
}
