//! Synchronous apply path shared by all workers.
//!
//! [`ConflictEngine::apply`] takes one change event through the whole
//! pipeline: metadata view → classifier → conflict index → issue lifecycle.
//! It is safe to call from many threads at once as long as events touching
//! the same entity or the same bucket are applied in feed order. The
//! detector's dispatcher guarantees both, using
//! [`touched_buckets`](ConflictEngine::touched_buckets) to find the buckets.

use std::sync::Arc;

use inferadb_issues_types::{ChangeEvent, ChangeKind, config::DetectorConfig};
use tracing::{debug, trace, warn};

use crate::{
    classifier::{self, NameClassifier},
    index::{BucketKey, ConflictIndex, MembershipChange},
    lifecycle::{IssueLifecycle, Transition},
    metrics::{self, Timer},
    view::{EventError, MetadataView, ViewUpdate},
};

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The change as published to view subscribers.
    pub update: ViewUpdate,
    /// Issue transitions caused by the change, in the order they happened.
    pub transitions: Vec<Transition>,
}

/// Owns the view, index, and issue state of one detector.
pub struct ConflictEngine {
    classifier: Arc<dyn NameClassifier>,
    view: MetadataView,
    index: ConflictIndex,
    lifecycle: IssueLifecycle,
}

impl std::fmt::Debug for ConflictEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictEngine")
            .field("classifier", &self.classifier.policy_name())
            .field("entities", &self.view.len())
            .field("buckets", &self.index.bucket_count())
            .field("active_issues", &self.lifecycle.active_count())
            .finish()
    }
}

impl ConflictEngine {
    /// Creates an engine using the configured classifier.
    pub fn new(config: &DetectorConfig) -> Self {
        Self::with_classifier(config, classifier::from_config(&config.classifier))
    }

    /// Creates an engine with a custom classifier.
    pub fn with_classifier(config: &DetectorConfig, classifier: Arc<dyn NameClassifier>) -> Self {
        Self {
            classifier,
            view: MetadataView::new(config.subscriber_capacity),
            index: ConflictIndex::new(),
            lifecycle: IssueLifecycle::new(config.resolved_history),
        }
    }

    /// Applies one change event.
    ///
    /// Skipped events are logged and counted here; callers only need the
    /// error to decide what to report.
    ///
    /// # Errors
    ///
    /// Returns the [`EventError`] describing why the event was skipped.
    pub fn apply(&self, event: &ChangeEvent) -> Result<Applied, EventError> {
        let timer = Timer::start();
        match self.view.apply(event, self.classifier.as_ref(), |change| self.reindex(change)) {
            Ok((update, transitions)) => {
                metrics::record_event_applied(event.kind, event.event, timer.elapsed_secs());
                trace!(
                    entity_id = %event.entity_id,
                    kind = %event.kind,
                    event = %event.event,
                    log_index = event.log_index,
                    "Applied change event"
                );
                Ok(Applied { update, transitions })
            },
            Err(err) => {
                metrics::record_event_skipped(err.reason());
                if err.is_redelivery() {
                    debug!(
                        entity_id = %event.entity_id,
                        log_index = event.log_index,
                        error = %err,
                        "Skipping redelivered event"
                    );
                } else {
                    warn!(
                        entity_id = %event.entity_id,
                        kind = %event.kind,
                        event = %event.event,
                        log_index = event.log_index,
                        error = %err,
                        "Skipping malformed change event"
                    );
                }
                Err(err)
            },
        }
    }

    /// Buckets `event` may leave or join if applied now.
    ///
    /// The entity's current bucket comes from the view, so the answer only
    /// holds while no other event for the same entity is in flight. A stale
    /// or malformed event can name a bucket it will not touch; that is harmless.
    pub(crate) fn touched_buckets(&self, event: &ChangeEvent) -> Vec<BucketKey> {
        let mut buckets = Vec::with_capacity(2);
        buckets.extend(self.view.current_bucket(&event.entity_id));
        if event.event != ChangeKind::Deleted {
            if let Some(name) = &event.display_name {
                buckets.push(BucketKey::new(event.kind, self.classifier.classify(name, event.kind)));
            }
        }
        buckets
    }

    fn reindex(&self, change: &MembershipChange) -> Vec<Transition> {
        let mut transitions = Vec::with_capacity(2);
        let id = change.entity_id;

        match &change.from {
            Some(old_key) if !change.stays_in_place() => {
                transitions.push(self.index.update(change.kind, old_key, |bucket_key, bucket| {
                    bucket.leave(&id);
                    self.lifecycle.reconcile(bucket_key, bucket)
                }));
            },
            _ => {},
        }
        if let Some((new_key, member)) = &change.to {
            transitions.push(self.index.update(change.kind, new_key, |bucket_key, bucket| {
                bucket.join(id, member.clone());
                self.lifecycle.reconcile(bucket_key, bucket)
            }));
        }

        transitions.retain(|transition| *transition != Transition::Unchanged);
        transitions
    }

    /// The configured classifier.
    pub fn classifier(&self) -> &dyn NameClassifier {
        self.classifier.as_ref()
    }

    /// The metadata view.
    pub fn view(&self) -> &MetadataView {
        &self.view
    }

    /// The conflict index.
    pub fn index(&self) -> &ConflictIndex {
        &self.index
    }

    /// The issue lifecycle manager.
    pub fn lifecycle(&self) -> &IssueLifecycle {
        &self.lifecycle
    }
}
