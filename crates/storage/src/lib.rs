//! Storage layer for mfdlog
//!
//! This crate implements everything that touches bytes or paths:
//! - Record codec: "define base path" and "delete entry" records
//! - PathTable: per-segment base-path interning
//! - DiskLayout: staging/final directories and segment file names
//! - Reliable filesystem operations with bounded and unbounded retry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod intern;
pub mod layout;
pub mod reliable;

pub use format::{
    decode_all, encode_record, Record, RecordHeader, RecordKind, RecordReader,
    RECORD_HEADER_SIZE,
};
pub use intern::{Interned, PathTable, MAX_PATH_ID};
pub use layout::{DiskLayout, SegmentNamer, SEGMENT_EXTENSION, TMP_EXTENSION};
pub use reliable::{
    create_dir_reliable, open_segment_reliable, rename_reliable, sync_dir, RetryPolicy,
};
