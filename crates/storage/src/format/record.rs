//! Segment record format.
//!
//! Every record is a 5-byte little-endian header followed by its payload:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────┬─────────────────────┐
//! │ kind: u8 │ path_id: u16 │ payload_len: u16 │ payload (UTF-8)     │
//! └──────────┴──────────────┴──────────────────┴─────────────────────┘
//! ```
//!
//! - kind 1, "define base path": payload is the base path, `path_id` is the
//!   identifier it is interned under for the rest of the segment.
//! - kind 2, "delete entry": payload is the relative directory, `path_id`
//!   refers to a base path defined earlier in the same segment.
//!
//! Records are self-delimiting through `payload_len`. A file is well formed
//! iff every declared length fits in the bytes that follow; a truncated
//! trailing record (crash mid-write) is reported, never repaired.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mfdlog_core::{Error, Result, MAX_PAYLOAD_LEN};
use std::io::{self, Read};

/// Size of the record header in bytes
pub const RECORD_HEADER_SIZE: usize = 5;

/// The two record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// Introduces a base path and its identifier
    DefineBasePath = 1,
    /// A directory to delete, relative to a defined base path
    DeleteEntry = 2,
}

impl RecordKind {
    /// On-disk tag byte
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::DefineBasePath),
            2 => Some(RecordKind::DeleteEntry),
            _ => None,
        }
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record kind
    pub kind: RecordKind,
    /// Base-path identifier
    pub path_id: u16,
    /// Number of payload bytes following the header
    pub payload_len: u16,
}

impl RecordHeader {
    /// Parse a header from the first [`RECORD_HEADER_SIZE`] bytes
    pub fn parse(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(Error::InvalidRecord(format!(
                "header needs {} bytes, have {}",
                RECORD_HEADER_SIZE,
                bytes.len()
            )));
        }
        let tag = bytes.read_u8()?;
        let kind = RecordKind::from_tag(tag)
            .ok_or_else(|| Error::InvalidRecord(format!("unknown record kind {}", tag)))?;
        let path_id = bytes.read_u16::<LittleEndian>()?;
        let payload_len = bytes.read_u16::<LittleEndian>()?;
        Ok(RecordHeader {
            kind,
            path_id,
            payload_len,
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u8(self.kind.tag())?;
        out.write_u16::<LittleEndian>(self.path_id)?;
        out.write_u16::<LittleEndian>(self.payload_len)?;
        Ok(())
    }
}

/// A decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record kind
    pub kind: RecordKind,
    /// Base-path identifier
    pub path_id: u16,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Record {
    /// A "define base path" record
    pub fn define(path_id: u16, base_path: &str) -> Self {
        Record {
            kind: RecordKind::DefineBasePath,
            path_id,
            payload: base_path.as_bytes().to_vec(),
        }
    }

    /// A "delete entry" record
    pub fn delete(path_id: u16, relative_dir: &str) -> Self {
        Record {
            kind: RecordKind::DeleteEntry,
            path_id,
            payload: relative_dir.as_bytes().to_vec(),
        }
    }

    /// Payload as text, if it is valid UTF-8
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Append this record's encoding to `out`
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<usize> {
        encode_record(self.kind, self.path_id, &self.payload, out)
    }
}

/// Append one encoded record to `out`, returning the bytes written
///
/// Payloads longer than [`MAX_PAYLOAD_LEN`] are rejected with
/// [`Error::PayloadTooLarge`] and leave `out` untouched.
pub fn encode_record(
    kind: RecordKind,
    path_id: u16,
    payload: &[u8],
    out: &mut Vec<u8>,
) -> Result<usize> {
    let payload_len = u16::try_from(payload.len()).map_err(|_| Error::PayloadTooLarge {
        len: payload.len(),
        max: MAX_PAYLOAD_LEN,
    })?;
    out.reserve(RECORD_HEADER_SIZE + payload.len());
    RecordHeader {
        kind,
        path_id,
        payload_len,
    }
    .write_to(out)?;
    out.extend_from_slice(payload);
    Ok(RECORD_HEADER_SIZE + payload.len())
}

/// Decode a whole segment image
///
/// Fails on the first malformed record, including a truncated tail.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Record>> {
    RecordReader::new(bytes).collect()
}

/// Streaming decoder over any reader
///
/// Yields records until a clean end of input. A header or payload cut short
/// yields one `Error::InvalidRecord` naming the offset, then the iterator
/// ends.
pub struct RecordReader<R> {
    inner: R,
    offset: u64,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// Wrap a reader positioned at the start of a segment
    pub fn new(inner: R) -> Self {
        RecordReader {
            inner,
            offset: 0,
            done: false,
        }
    }

    /// Byte offset of the next record
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_record(&mut self) -> Result<Option<Record>> {
        let mut header = [0u8; RECORD_HEADER_SIZE];
        let mut filled = 0;
        while filled < RECORD_HEADER_SIZE {
            match self.inner.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < RECORD_HEADER_SIZE {
            return Err(Error::InvalidRecord(format!(
                "truncated header at offset {}: {} of {} bytes",
                self.offset, filled, RECORD_HEADER_SIZE
            )));
        }

        let header = RecordHeader::parse(&header).map_err(|e| match e {
            Error::InvalidRecord(msg) => {
                Error::InvalidRecord(format!("{} at offset {}", msg, self.offset))
            }
            other => other,
        })?;

        let mut payload = vec![0u8; header.payload_len as usize];
        self.inner.read_exact(&mut payload).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidRecord(format!(
                    "truncated payload at offset {}: declared {} bytes",
                    self.offset, header.payload_len
                ))
            } else {
                Error::Io(e)
            }
        })?;

        self.offset += (RECORD_HEADER_SIZE + payload.len()) as u64;
        Ok(Some(Record {
            kind: header.kind,
            path_id: header.path_id,
            payload,
        }))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
