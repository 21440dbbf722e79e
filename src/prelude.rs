//! Convenient imports for mfdlog.
//!
//! ```ignore
//! use mfdlog::prelude::*;
//!
//! let registry = DiskRegistry::from_config(&ManagerConfig::default())?;
//! ```

// Entry points
pub use mfdlog_engine::{DiskRegistry, DiskWriter};

// Error handling
pub use mfdlog_core::{Error, Result};

// Configuration
pub use mfdlog_core::{
    DiscoveryConfig, DiskSpec, ManagerConfig, RelocationConfig, RetryConfig, SegmentConfig,
};

// Core types
pub use mfdlog_core::{Clock, DeleteEvent, DiskId, ManualClock, SystemClock};

// Segment files
pub use mfdlog_durability::{SegmentWriter, WriterStatsSnapshot};
pub use mfdlog_storage::{decode_all, DiskLayout, Record, RecordKind};
