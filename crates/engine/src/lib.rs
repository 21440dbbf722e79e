//! Engine for mfdlog
//!
//! Wires the storage and durability layers into a running service:
//! - DiskWriter: one thread and one bounded queue per disk
//! - DiskRegistry: routes appends to disks, owns the relocation pool
//! - Routing: disk discovery and request-path splitting
//!
//! ```ignore
//! use mfdlog_engine::DiskRegistry;
//!
//! let registry = DiskRegistry::from_config(&config)?;
//! registry.append("data1", "/data1/ns/bucket", "/obj/dir");
//! registry.append_path("/data1/ns/bucket/obj/dir");
//! registry.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod routing;
pub mod writer;

pub use registry::DiskRegistry;
pub use routing::{discover_disks, split_request_path, RoutedPath, REMOTE_DATA};
pub use writer::DiskWriter;
