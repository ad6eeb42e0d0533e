//! Observability metrics exposed via Prometheus using the `metrics` crate.
//!
//! ## Metric Naming Conventions
//!
//! All metrics follow the pattern: `issues_{subsystem}_{name}_{unit}`
//!
//! - Counters: `_total` suffix
//! - Histograms: `_seconds` suffix
//! - Gauges: no suffix

use std::time::Instant;

use inferadb_issues_types::{ChangeKind, EntityKind};
use metrics::{counter, gauge, histogram};

use crate::lifecycle::Transition;

// =============================================================================
// Metric Names (constants for consistency)
// =============================================================================

// Feed metrics
const EVENTS_APPLIED_TOTAL: &str = "issues_feed_events_applied_total";
const EVENTS_SKIPPED_TOTAL: &str = "issues_feed_events_skipped_total";
const APPLY_LATENCY: &str = "issues_feed_apply_latency_seconds";
const APPLIED_WATERMARK: &str = "issues_feed_applied_watermark";

// Issue metrics
const ISSUE_TRANSITIONS_TOTAL: &str = "issues_lifecycle_transitions_total";
const ACTIVE_ISSUES: &str = "issues_lifecycle_active";

// Query metrics
const QUERIES_TOTAL: &str = "issues_queries_total";

// Phase metrics
const DETECTOR_READY: &str = "issues_detector_ready";

// =============================================================================
// Feed Metrics
// =============================================================================

/// Records an applied change event.
#[inline]
pub fn record_event_applied(kind: EntityKind, event: ChangeKind, latency_secs: f64) {
    counter!(EVENTS_APPLIED_TOTAL, "kind" => kind.as_str(), "event" => event.as_str())
        .increment(1);
    histogram!(APPLY_LATENCY).record(latency_secs);
}

/// Records a change event that was skipped.
#[inline]
pub fn record_event_skipped(reason: &'static str) {
    counter!(EVENTS_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

/// Sets the applied watermark.
#[inline]
pub fn set_applied_watermark(log_index: u64) {
    gauge!(APPLIED_WATERMARK).set(log_index as f64);
}

// =============================================================================
// Issue Metrics
// =============================================================================

/// Records an issue lifecycle transition.
#[inline]
pub fn record_issue_transition(kind: EntityKind, transition: Transition) {
    counter!(ISSUE_TRANSITIONS_TOTAL, "kind" => kind.as_str(), "transition" => transition.as_str())
        .increment(1);
}

/// Sets the number of active issues.
#[inline]
pub fn set_active_issues(count: usize) {
    gauge!(ACTIVE_ISSUES).set(count as f64);
}

// =============================================================================
// Query Metrics
// =============================================================================

/// Records an issue query.
#[inline]
pub fn record_query(operation: &'static str, outcome: &'static str) {
    counter!(QUERIES_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

// =============================================================================
// Phase Metrics
// =============================================================================

/// Sets whether the detector is serving queries.
#[inline]
pub fn set_ready(ready: bool) {
    gauge!(DETECTOR_READY).set(if ready { 1.0 } else { 0.0 });
}

// =============================================================================
// Timer
// =============================================================================

/// Measures elapsed time since construction.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Starts a timer.
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Seconds elapsed since the timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
