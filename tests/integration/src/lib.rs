//! Integration test utilities for the gateway client
//!
//! This crate provides helpers for running end-to-end session scenarios
//! over the in-memory transport and bootstrap against a mock HTTP API.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
