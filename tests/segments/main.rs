//! Segment Pipeline Integration Tests
//!
//! End-to-end tests across the crates: events in through the registry,
//! segments out in the final store.

#[path = "../common/mod.rs"]
mod common;

mod recovery;
mod registry;
mod relocation;
mod rotation;
