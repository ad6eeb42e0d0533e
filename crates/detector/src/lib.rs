//! Name-conflict issue detector for InferaDB cluster metadata.
//!
//! This crate provides:
//! - A local, eventually consistent view of named cluster entities
//! - Pluggable name-equivalence classification
//! - An incrementally maintained index of entities grouped by canonical name
//! - Lifecycle management of `NAME_CONFLICT_ISSUE` records
//! - A read-only query surface for administrative clients
//!
//! # Data Flow
//!
//! ```text
//! change feed → MetadataView → NameClassifier → ConflictIndex → IssueLifecycle
//!                                                                    │
//!                                            IssueQuery ◀────────────┘
//! ```
//!
//! [`Detector`] wires these together behind an async feed and per-entity
//! ordered workers. [`ConflictEngine`] is the synchronous core, usable on its
//! own when events are already ordered.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod detector;
pub mod engine;
pub mod index;
pub mod lifecycle;
pub mod metrics;
pub mod phase;
pub mod query;
mod sequencer;
pub mod view;
pub mod watermark;

pub use classifier::{CaseInsensitive, CaseSensitive, NameClassifier};
pub use detector::{Detector, FeedSender};
pub use engine::{Applied, ConflictEngine};
pub use index::{ConflictGroup, ConflictIndex};
pub use lifecycle::{IssueLifecycle, Transition};
pub use phase::{DetectorPhase, PhaseState};
pub use query::IssueQuery;
pub use view::{EventError, MetadataView, ViewChange, ViewUpdate};
pub use watermark::Watermark;
