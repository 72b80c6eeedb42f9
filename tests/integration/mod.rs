//! Integration tests for relocator
//!
//! These tests package a shared tree, install the bundle and load payloads
//! back through the entry point.

#[path = "../common/mod.rs"]
pub mod common;

pub mod eviction;
pub mod failures;
pub mod isolation;
pub mod round_trip;
