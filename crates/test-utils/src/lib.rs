//! Shared test utilities for the InferaDB issue detector crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`FeedScript`] - Scripted change feeds with consistent log indexes
//! - [`test_detector_config`] - Small detector configuration for tests
//! - [`strategies`] - Proptest generators for names, kinds, and change feeds

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod assertions;
pub use assertions::assert_eventually;

mod fixtures;
pub use fixtures::{FeedScript, test_detector_config};

pub mod strategies;
