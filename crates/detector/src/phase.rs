//! Detector lifecycle phase.
//!
//! Transitions: `Starting` → `Ready` → `ShuttingDown`, one-way. `Ready` is
//! entered once the metadata layer has announced the end of its initial
//! replay and everything up to that point has been applied.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use inferadb_issues_types::DetectorError;

use crate::metrics;

/// Detector lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DetectorPhase {
    /// Initial replay still in progress; queries would see a partial view.
    Starting = 0,
    /// Serving queries.
    Ready = 1,
    /// Draining; queries are rejected.
    ShuttingDown = 2,
}

impl DetectorPhase {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::Ready,
            2 => Self::ShuttingDown,
            _ => Self::Starting,
        }
    }

    /// Label used in logs and health responses.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Shared, lock-free phase cell.
#[derive(Debug, Clone)]
pub struct PhaseState {
    phase: Arc<AtomicU8>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseState {
    /// Creates a phase cell in `Starting`.
    pub fn new() -> Self {
        Self { phase: Arc::new(AtomicU8::new(DetectorPhase::Starting as u8)) }
    }

    /// Current phase.
    pub fn phase(&self) -> DetectorPhase {
        DetectorPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// `Starting` → `Ready`. Returns `false` from any other phase.
    pub fn mark_ready(&self) -> bool {
        let changed = self
            .phase
            .compare_exchange(
                DetectorPhase::Starting as u8,
                DetectorPhase::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if changed {
            metrics::set_ready(true);
        }
        changed
    }

    /// Moves to `ShuttingDown` from any phase (idempotent).
    pub fn mark_shutting_down(&self) {
        self.phase.store(DetectorPhase::ShuttingDown as u8, Ordering::Release);
        metrics::set_ready(false);
    }

    /// Whether queries may be served.
    pub fn is_ready(&self) -> bool {
        self.phase() == DetectorPhase::Ready
    }

    /// Fails unless the detector is serving queries.
    ///
    /// # Errors
    ///
    /// [`DetectorError::NotReady`] while starting, [`DetectorError::ShuttingDown`]
    /// once draining.
    pub fn ensure_serving(&self) -> Result<(), DetectorError> {
        match self.phase() {
            DetectorPhase::Ready => Ok(()),
            DetectorPhase::Starting => Err(DetectorError::NotReady),
            DetectorPhase::ShuttingDown => Err(DetectorError::ShuttingDown),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_not_ready() {
        let state = PhaseState::new();
        assert_eq!(state.phase(), DetectorPhase::Starting);
        assert!(matches!(state.ensure_serving(), Err(DetectorError::NotReady)));
    }

    #[test]
    fn test_transitions_are_one_way() {
        let state = PhaseState::new();
        assert!(state.mark_ready());
        assert!(!state.mark_ready());
        assert!(state.ensure_serving().is_ok());

        state.mark_shutting_down();
        assert!(!state.mark_ready());
        assert_eq!(state.phase(), DetectorPhase::ShuttingDown);
        assert!(matches!(state.ensure_serving(), Err(DetectorError::ShuttingDown)));
    }

    #[test]
    fn test_clones_share_state() {
        let state = PhaseState::new();
        let clone = state.clone();
        state.mark_ready();
        assert!(clone.is_ready());
    }
}
