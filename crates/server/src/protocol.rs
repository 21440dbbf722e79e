//! Length-prefixed framing for the manager socket
//!
//! Every request is a frame:
//!
//! ```text
//! ┌────────────┬──────────┬───────────┬──────────────────────┐
//! │ len: u32LE │ kind: u8 │ seq: u16LE│ path: len - 3 bytes  │
//! └────────────┴──────────┴───────────┴──────────────────────┘
//! ```
//!
//! `len` counts the body only (kind + seq + path) and is at most
//! [`MAX_FRAME_LEN`]. Every request gets a fixed 4-byte reply echoing `seq`:
//!
//! ```text
//! ┌──────────┬───────────┬────────────┐
//! │ kind = 2 │ seq: u16LE│ status: u8 │
//! └──────────┴───────────┴────────────┘
//! ```

use byteorder::{ByteOrder, LittleEndian};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Request kind: append the path as a delete event
pub const KIND_APPEND: u8 = 1;
/// Reply kind
pub const KIND_REPLY: u8 = 2;

/// Reply status: event accepted
pub const STATUS_ACCEPTED: u8 = 1;
/// Reply status: event rejected
pub const STATUS_REJECTED: u8 = 0;

/// Largest request body accepted
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Bytes before the path in a request body
pub const REQUEST_HEADER_LEN: usize = 3;

/// Size of an encoded reply
pub const REPLY_LEN: usize = 4;

/// Framing errors; all of them end the connection
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared body length above [`MAX_FRAME_LEN`]
    #[error("frame of {0} bytes exceeds the {} byte limit", MAX_FRAME_LEN)]
    TooLarge(usize),

    /// Body too short to hold kind and sequence number
    #[error("frame of {0} bytes is shorter than the request header")]
    TooShort(usize),

    /// Connection failed or closed mid-frame
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request kind
    pub kind: u8,
    /// Sequence number chosen by the client, echoed in the reply
    pub seq: u16,
    /// Raw path bytes
    pub body: Vec<u8>,
}

impl Request {
    /// Decode a frame body (without the length prefix)
    pub fn decode(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < REQUEST_HEADER_LEN {
            return Err(FrameError::TooShort(body.len()));
        }
        Ok(Request {
            kind: body[0],
            seq: LittleEndian::read_u16(&body[1..3]),
            body: body[REQUEST_HEADER_LEN..].to_vec(),
        })
    }

    /// The path, if it is valid UTF-8
    pub fn path(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Append the framed request (length prefix included) to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let len = (REQUEST_HEADER_LEN + self.body.len()) as u32;
        let mut header = [0u8; 4 + REQUEST_HEADER_LEN];
        LittleEndian::write_u32(&mut header[0..4], len);
        header[4] = self.kind;
        LittleEndian::write_u16(&mut header[5..7], self.seq);
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.body);
    }
}

/// Reply to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Sequence number of the request
    pub seq: u16,
    /// Whether the event was accepted
    pub accepted: bool,
}

impl Reply {
    /// Encode to the fixed wire form
    pub fn encode(&self) -> [u8; REPLY_LEN] {
        let mut buf = [0u8; REPLY_LEN];
        buf[0] = KIND_REPLY;
        LittleEndian::write_u16(&mut buf[1..3], self.seq);
        buf[3] = if self.accepted {
            STATUS_ACCEPTED
        } else {
            STATUS_REJECTED
        };
        buf
    }

    /// Decode the fixed wire form; `None` if the kind byte is wrong
    pub fn decode(buf: &[u8; REPLY_LEN]) -> Option<Self> {
        if buf[0] != KIND_REPLY {
            return None;
        }
        Some(Reply {
            seq: LittleEndian::read_u16(&buf[1..3]),
            accepted: buf[3] == STATUS_ACCEPTED,
        })
    }
}

/// Read one frame body into `buf`
///
/// Returns `Ok(false)` on a clean end of stream before a new frame starts.
/// An oversized length is reported before any of the body is read.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf).await?;
    Ok(true)
}
