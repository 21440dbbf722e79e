//! On-disk byte format for segments.
//!
//! A segment is nothing but a run of records: no header, footer, magic
//! number or checksum. Keeping the format here, apart from the writer that
//! produces it, keeps repair tooling and tests from depending on the engine.
//!
//! # Module Structure
//!
//! - `record`: record header layout, encoding and decoding

pub mod record;

pub use record::{
    decode_all, encode_record, Record, RecordHeader, RecordKind, RecordReader,
    RECORD_HEADER_SIZE,
};
