//! Durability layer for mfdlog
//!
//! This crate turns delete events into files that survive crashes:
//! - SegmentWriter: appends records, rotates segments by size and age
//! - Relocation: copies finalized segments from staging into the disk's
//!   final store with a temp-file + rename protocol
//! - Stats: counters that surface stalled writers and relocation backlog
//!
//! ## Crash behavior
//!
//! A segment is either still in staging or fully present in the final
//! directory. Segments left in staging by a crash are requeued when the
//! disk's writer next opens.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod relocation;
pub mod segment;
pub mod stats;

pub use relocation::{
    relocate_once, relocate_until_done, requeue_staged, CollectingSink, RelocateOutcome,
    RelocationJob, RelocationPool, SegmentSink, ShutdownSignal,
};
pub use segment::{SegmentWriter, SegmentWriterBuilder};
pub use stats::{RelocationStats, RelocationStatsSnapshot, WriterStats, WriterStatsSnapshot};
