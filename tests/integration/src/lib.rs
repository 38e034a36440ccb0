//! Integration test utilities for the presence daemon
//!
//! This crate provides a mock platform (gateway WebSocket plus the
//! detectable games endpoint) and helpers for running the daemon against it.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
