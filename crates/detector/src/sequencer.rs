//! Causal ordering of in-flight events across apply workers.
//!
//! Workers are picked by entity, but one event can touch buckets another
//! entity's event also touches. Two renames into and out of the same bucket
//! must be applied in feed order, or a conflict that never stopped can be
//! resolved and re-opened under a fresh issue id.
//!
//! Before dispatching an event the dispatcher claims everything the event
//! touches: its entity and each bucket it leaves or joins. It waits while any
//! of those is still claimed by an earlier event. The worker releases the
//! claims once the event has been applied.

use std::collections::HashSet;

use inferadb_issues_types::EntityId;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::index::BucketKey;

/// Something an in-flight event holds exclusively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum Claim {
    /// The entity the event changes.
    Entity(EntityId),
    /// A bucket the entity leaves or joins.
    Bucket(BucketKey),
}

/// The distinct claims of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Claims(Vec<Claim>);

impl Claims {
    /// Claims on `entity_id` and `buckets`, without duplicates.
    pub(crate) fn new(entity_id: EntityId, buckets: impl IntoIterator<Item = BucketKey>) -> Self {
        let mut claims: Vec<Claim> = std::iter::once(Claim::Entity(entity_id))
            .chain(buckets.into_iter().map(Claim::Bucket))
            .collect();
        claims.sort_unstable();
        claims.dedup();
        Self(claims)
    }

    fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.0.iter()
    }
}

/// Tracks which entities and buckets have an event in flight.
#[derive(Debug, Default)]
pub(crate) struct Sequencer {
    held: Mutex<HashSet<Claim>>,
    released: Notify,
}

impl Sequencer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Waits until no in-flight event holds `claim`.
    pub(crate) async fn wait_free(&self, claim: &Claim) {
        self.wait_until(|held| !held.contains(claim)).await;
    }

    /// Waits until none of `claims` is held, then takes all of them at once.
    pub(crate) async fn acquire(&self, claims: &Claims) {
        self.wait_until(|held| {
            if claims.iter().any(|claim| held.contains(claim)) {
                return false;
            }
            held.extend(claims.iter().cloned());
            true
        })
        .await;
    }

    /// Gives `claims` back and wakes the dispatcher.
    pub(crate) fn release(&self, claims: &Claims) {
        {
            let mut held = self.held.lock();
            for claim in claims.iter() {
                held.remove(claim);
            }
        }
        self.released.notify_waiters();
    }

    #[cfg(test)]
    fn held(&self) -> usize {
        self.held.lock().len()
    }

    async fn wait_until(&self, mut ready: impl FnMut(&mut HashSet<Claim>) -> bool) {
        loop {
            // Registered before checking, so a release in between is not missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            {
                let mut held = self.held.lock();
                if ready(&mut *held) {
                    return;
                }
            }
            released.await;
        }
    }
}
