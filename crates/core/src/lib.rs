//! Core types for mfdlog
//!
//! This crate defines what every other layer shares:
//! - [`DiskId`] and [`DeleteEvent`]: the unit of work routed to a disk
//! - [`Error`]: error taxonomy for the whole workspace
//! - [`Clock`]: time source seam used by rotation and segment naming
//! - [`ManagerConfig`]: TOML-backed configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DiscoveryConfig, DiskSpec, ManagerConfig, RelocationConfig, RetryConfig, SegmentConfig,
};
pub use error::{Error, Result};
pub use types::{DeleteEvent, DiskId, MAX_PAYLOAD_LEN};
