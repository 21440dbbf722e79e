//! Core types for the delete-event pipeline
//!
//! - [`DiskId`]: identifier of one physical disk (e.g. `data7`)
//! - [`DeleteEvent`]: one "delete this directory" request

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Largest payload a single record can carry (16-bit length field).
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Identifier of a physical disk
///
/// DiskId is the key the registry routes on, the name of the disk's staging
/// directory, and the first component of incoming request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiskId(String);

impl DiskId {
    /// Create a DiskId from any string-like value
    ///
    /// # Examples
    ///
    /// ```
    /// use mfdlog_core::DiskId;
    ///
    /// let id = DiskId::new("data1");
    /// assert_eq!(id.as_str(), "data1");
    /// ```
    pub fn new(id: impl Into<String>) -> Self {
        DiskId(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for DiskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DiskId {
    fn from(s: &str) -> Self {
        DiskId::new(s)
    }
}

impl From<String> for DiskId {
    fn from(s: String) -> Self {
        DiskId(s)
    }
}

/// A request to delete `relative_dir` under `base_path`
///
/// Events are never persisted as a structure: the writer turns each one into
/// an optional "define base path" record plus one "delete entry" record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEvent {
    /// Base path, interned per segment
    pub base_path: String,
    /// Directory to delete, relative to the base path
    pub relative_dir: String,
}

impl DeleteEvent {
    /// Create a new delete event
    pub fn new(base_path: impl Into<String>, relative_dir: impl Into<String>) -> Self {
        DeleteEvent {
            base_path: base_path.into(),
            relative_dir: relative_dir.into(),
        }
    }

    /// Check that both halves fit in a record payload
    ///
    /// Events failing this check are rejected at submission instead of being
    /// truncated on disk.
    pub fn fits_record(&self) -> bool {
        self.base_path.len() <= MAX_PAYLOAD_LEN && self.relative_dir.len() <= MAX_PAYLOAD_LEN
    }
}
