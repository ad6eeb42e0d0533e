//! InferaDB issue detector admin server.
//!
//! Provides the HTTP surface over a running detector, configuration loading,
//! and shutdown handling.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod shutdown;
