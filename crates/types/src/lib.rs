//! Core types, errors, and configuration for the InferaDB name-conflict issue detector.
//!
//! This crate provides the foundational types shared by the detector and its
//! admin server:
//! - Identifier newtypes (EntityId, IssueId)
//! - Mirrored entity records and canonical conflict keys
//! - Inbound change-feed records
//! - Issue records and filters
//! - Error types using snafu
//! - Configuration with validating builders

pub mod config;
pub mod error;
pub mod event;
pub mod issue;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{DetectorError, ErrorCode, Result};
pub use event::{ChangeEvent, ChangeKind, FeedMessage};
pub use issue::{Issue, IssueDetails, IssueFilter, IssueType, NameConflict, ResolvedIssue};
pub use types::*;
