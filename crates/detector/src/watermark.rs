//! Applied watermark.
//!
//! The watermark is the highest commit index `L` such that every event with
//! index `<= L` that has reached the dispatcher has also been applied. Events
//! are applied out of order across workers, so the dispatcher registers each
//! event before handing it off and the worker finishes it afterwards:
//!
//! ```text
//! seen:      1 2 3 4 5 6
//! in flight:     3   5
//! watermark: 2
//! ```
//!
//! The watermark never moves backwards: a redelivered event carrying an old
//! index is registered like any other, but cannot lower the published value.
//!
//! The value is published on a watch channel so callers can wait for a
//! specific index instead of sleeping.

use std::{collections::BTreeMap, time::Duration};

use inferadb_issues_types::DetectorError;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::metrics;

#[derive(Debug, Default)]
struct Progress {
    /// Highest index seen by the dispatcher.
    highest_seen: u64,
    /// Index → number of events with that index not yet applied.
    in_flight: BTreeMap<u64, usize>,
    /// Last computed watermark.
    applied: u64,
}

impl Progress {
    fn advance(&mut self) -> u64 {
        let candidate = match self.in_flight.keys().next() {
            Some(lowest) => lowest.saturating_sub(1),
            None => self.highest_seen,
        };
        self.applied = self.applied.max(candidate);
        self.applied
    }
}

/// Tracks and publishes the applied watermark.
#[derive(Debug)]
pub struct Watermark {
    progress: Mutex<Progress>,
    published: watch::Sender<u64>,
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new()
    }
}

impl Watermark {
    /// Creates a watermark at 0.
    pub fn new() -> Self {
        let (published, _) = watch::channel(0);
        Self { progress: Mutex::new(Progress::default()), published }
    }

    /// Registers an event about to be applied.
    pub fn begin(&self, log_index: u64) {
        let mut progress = self.progress.lock();
        progress.highest_seen = progress.highest_seen.max(log_index);
        *progress.in_flight.entry(log_index).or_default() += 1;
        self.publish(&mut progress);
    }

    /// Marks a registered event as applied (or skipped).
    pub fn finish(&self, log_index: u64) {
        let mut progress = self.progress.lock();
        if let Some(count) = progress.in_flight.get_mut(&log_index) {
            *count -= 1;
            if *count == 0 {
                progress.in_flight.remove(&log_index);
            }
        }
        self.publish(&mut progress);
    }

    /// Records that the feed has delivered everything through `log_index`.
    pub fn observe(&self, log_index: u64) {
        let mut progress = self.progress.lock();
        progress.highest_seen = progress.highest_seen.max(log_index);
        self.publish(&mut progress);
    }

    /// Current watermark.
    pub fn current(&self) -> u64 {
        *self.published.borrow()
    }

    /// Receiver that observes every watermark change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }

    /// Waits until the watermark reaches `log_index`.
    ///
    /// Returns the watermark observed at that point.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::WatermarkTimeout`] if `timeout` elapses first.
    pub async fn wait_for(
        &self,
        log_index: u64,
        timeout: Option<Duration>,
    ) -> Result<u64, DetectorError> {
        let mut rx = self.published.subscribe();
        let reached = async move {
            rx.wait_for(|applied| *applied >= log_index)
                .await
                .map(|applied| *applied)
                .map_err(|_| DetectorError::FeedClosed)
        };
        match timeout {
            None => reached.await,
            Some(limit) => match tokio::time::timeout(limit, reached).await {
                Ok(result) => result,
                Err(_) => Err(DetectorError::WatermarkTimeout {
                    log_index,
                    applied: self.current(),
                    waited: limit,
                }),
            },
        }
    }

    fn publish(&self, progress: &mut Progress) {
        let watermark = progress.advance();
        let changed = self.published.send_if_modified(|current| {
            if *current == watermark {
                false
            } else {
                *current = watermark;
                true
            }
        });
        if changed {
            metrics::set_applied_watermark(watermark);
        }
    }
}
