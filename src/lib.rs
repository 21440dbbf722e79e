//! # mfdlog
//!
//! Durable per-disk logs of "delete this directory" requests.
//!
//! Each disk gets its own sequence of segments. A segment is a run of small
//! binary records: a base path is defined once per segment under a 16-bit
//! identifier, and every delete entry refers to it by that identifier.
//! Segments rotate on record count or age, are finalized in a staging area
//! and then copied into the disk's final store with a temp-file + rename
//! protocol, so a reader of the final store never sees a partial segment.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mfdlog::prelude::*;
//!
//! let config = ManagerConfig::from_file("/etc/mfd-manager.toml")?;
//! let registry = DiskRegistry::from_config(&config)?;
//!
//! // Explicit disk, base path and relative directory
//! registry.append("data1", "/data1/ns/bucket", "/obj/dir");
//!
//! // Or a full request path, routed by its first component
//! registry.append_path("/data1/ns/bucket/obj/dir");
//!
//! // Drain every queue before exit
//! registry.shutdown();
//! ```
//!
//! ## Layers
//!
//! - [`mfdlog_core`]: identifiers, events, errors, configuration, clock
//! - [`mfdlog_storage`]: record codec, path interning, on-disk layout, retrying I/O
//! - [`mfdlog_durability`]: segment writer, rotation, relocation, counters
//! - [`mfdlog_engine`]: per-disk writer threads and the disk registry

#![warn(missing_docs)]

pub mod prelude;

pub use mfdlog_core;
pub use mfdlog_durability;
pub use mfdlog_engine;
pub use mfdlog_storage;

pub use mfdlog_core::{DeleteEvent, DiskId, Error, ManagerConfig, Result};
pub use mfdlog_engine::{DiskRegistry, DiskWriter};
