//! Proptest strategies for issue detector domain types.
//!
//! Reusable generators for property-based testing across crates. Name pools
//! are deliberately small and full of case variants so that generated feeds
//! produce conflicts, resolutions, and re-formed conflicts often.
//!
//! # Usage
//!
//! ```no_run
//! use inferadb_issues_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(events in strategies::arb_change_events(64)) {
//!         // feed the events, then check an invariant
//!     }
//! }
//! ```

use inferadb_issues_types::{ChangeEvent, EntityId, EntityKind};
use proptest::prelude::*;
use uuid::Uuid;

/// Display names used by generated feeds.
///
/// Groups of case variants, a Unicode full-fold pair, a whitespace variant,
/// and the empty name.
pub const NAME_POOL: &[&str] = &[
    "users",
    "USERS",
    "Users",
    "orders",
    "Orders",
    "straße",
    "STRASSE",
    "users ",
    "",
];

/// Number of distinct entities a generated feed touches.
pub const ENTITY_SLOTS: usize = 6;

/// Generates an arbitrary [`EntityKind`].
pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

/// Generates a display name from [`NAME_POOL`].
pub fn arb_pooled_name() -> impl Strategy<Value = String> {
    prop::sample::select(NAME_POOL).prop_map(str::to_string)
}

/// Generates an arbitrary display name of up to 24 characters, mixing ASCII,
/// accented Latin letters, and whitespace.
pub fn arb_display_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _àéîõüßÀÉÎÕÜ\t-]{0,24}"
}

/// Stable identifier of entity slot `slot` in generated feeds.
pub fn slot_id(slot: usize) -> EntityId {
    EntityId::new(Uuid::from_u128(slot as u128 + 1))
}

/// Kind of entity slot `slot` in generated feeds.
///
/// Alternates between namespaces and datacenters so that equal names across
/// kinds are exercised too.
pub fn slot_kind(slot: usize) -> EntityKind {
    if slot % 2 == 0 { EntityKind::Namespace } else { EntityKind::Datacenter }
}

#[derive(Debug, Clone)]
enum Step {
    Create { slot: usize, name: String },
    Rename { slot: usize, name: String },
    Delete { slot: usize },
    Redeliver { back: usize },
}

fn arb_step() -> impl Strategy<Value = Step> {
    let slot = 0..ENTITY_SLOTS;
    prop_oneof![
        3 => (slot.clone(), arb_pooled_name()).prop_map(|(slot, name)| Step::Create { slot, name }),
        3 => (slot.clone(), arb_pooled_name()).prop_map(|(slot, name)| Step::Rename { slot, name }),
        1 => slot.prop_map(|slot| Step::Delete { slot }),
        1 => (0usize..16).prop_map(|back| Step::Redeliver { back }),
    ]
}

/// Generates a feed of up to `max_len` change events.
///
/// Fresh events carry strictly increasing log indexes starting at 1.
/// Redelivered events repeat an earlier event verbatim, as an at-least-once
/// feed would. Some events are deliberately invalid (rename of an entity
/// that does not exist, create of one that does) and must be skipped.
pub fn arb_change_events(max_len: usize) -> impl Strategy<Value = Vec<ChangeEvent>> {
    proptest::collection::vec(arb_step(), 0..max_len).prop_map(|steps| {
        let mut events: Vec<ChangeEvent> = Vec::with_capacity(steps.len());
        let mut log_index = 0;
        for step in steps {
            let event = match step {
                Step::Redeliver { back } => {
                    if events.is_empty() {
                        continue;
                    }
                    events[events.len() - 1 - back % events.len()].clone()
                },
                Step::Create { slot, name } => {
                    log_index += 1;
                    ChangeEvent::created(slot_id(slot), slot_kind(slot), name, log_index)
                },
                Step::Rename { slot, name } => {
                    log_index += 1;
                    ChangeEvent::renamed(slot_id(slot), slot_kind(slot), name, log_index)
                },
                Step::Delete { slot } => {
                    log_index += 1;
                    ChangeEvent::deleted(slot_id(slot), slot_kind(slot), log_index)
                },
            };
            events.push(event);
        }
        events
    })
}
