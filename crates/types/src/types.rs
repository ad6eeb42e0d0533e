//! Core type definitions for the name-conflict issue detector.
//!
//! - Identifier types (EntityId, IssueId)
//! - Entity kinds and mirrored entity records
//! - Canonical conflict keys

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around a [`Uuid`] for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` so the wire format is the bare UUID string
/// - `From<Uuid>` and `Into<Uuid>` conversions
/// - `Display` as the hyphenated UUID (no prefix, matches what admin clients compare against)
/// - `new()` constructor, `random()` generator, and `value()` accessor
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new identifier from a raw UUID.
            #[inline]
            pub const fn new(value: Uuid) -> Self {
                Self(value)
            }

            /// Generates a fresh random (v4) identifier.
            #[inline]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the raw UUID.
            #[inline]
            pub const fn value(self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<Uuid>().map(Self)
            }
        }
    };
}

define_uuid_id!(
    /// Identity of a named cluster entity (namespace, datacenter, server, database).
    ///
    /// Assigned by the replicated metadata layer and never reused. The display
    /// name of an entity may change; its `EntityId` does not.
    EntityId
);

define_uuid_id!(
    /// Identity of an issue record.
    ///
    /// Stable for as long as the conflict it describes stays active. A conflict
    /// that is resolved and later re-forms gets a fresh `IssueId`.
    IssueId
);

// ============================================================================
// Entity Types
// ============================================================================

/// Kind of named cluster object subject to the uniqueness policy.
///
/// Names only conflict within a kind: a namespace and a datacenter may share
/// a name freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A namespace (table-level data container).
    Namespace,
    /// A datacenter (placement grouping for servers).
    Datacenter,
    /// A server (cluster member process).
    Server,
    /// A database (grouping of namespaces).
    Database,
}

impl EntityKind {
    /// Every entity kind, in declaration order.
    pub const ALL: [EntityKind; 4] =
        [EntityKind::Namespace, EntityKind::Datacenter, EntityKind::Server, EntityKind::Database];

    /// Returns the wire name of the kind (`"namespace"`, `"datacenter"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Datacenter => "datacenter",
            Self::Server => "server",
            Self::Database => "database",
        }
    }

    /// Returns the plural form used in human-readable issue descriptions.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Namespace => "namespaces",
            Self::Datacenter => "datacenters",
            Self::Server => "servers",
            Self::Database => "databases",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEntityKind { value: s.to_string() })
    }
}

/// Returned when parsing an [`EntityKind`] from an unrecognized string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityKind {
    /// The string that failed to parse.
    pub value: String,
}

impl fmt::Display for UnknownEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity kind: {:?}", self.value)
    }
}

impl std::error::Error for UnknownEntityKind {}

/// Read-only mirror of a named entity owned by the metadata layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identity.
    pub id: EntityId,
    /// Kind of object.
    pub kind: EntityKind,
    /// Current display name, exactly as the operator entered it.
    pub display_name: String,
}

impl Entity {
    /// Creates a new entity record.
    pub fn new(id: EntityId, kind: EntityKind, display_name: impl Into<String>) -> Self {
        Self { id, kind, display_name: display_name.into() }
    }
}

// ============================================================================
// Conflict Keys
// ============================================================================

/// Canonical form of a display name under the configured equivalence policy.
///
/// Two entities of the same kind whose names map to equal keys are contesting
/// the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictKey(String);

impl ConflictKey {
    /// Wraps an already-canonicalized string.
    pub fn new(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    /// Returns the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
