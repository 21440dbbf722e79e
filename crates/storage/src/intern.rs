//! Per-segment base-path interning
//!
//! Base paths repeat across thousands of delete entries, so each segment
//! writes a base path once and refers to it by a 16-bit identifier after
//! that. Identifiers are handed out in first-seen order starting at 1
//! (0 is reserved) and are only meaningful inside the segment that defined
//! them: the table is cleared on every rotation.

use mfdlog_core::{Error, Result};
use rustc_hash::FxHashMap;

/// Highest identifier a segment can hand out
pub const MAX_PATH_ID: u16 = u16::MAX;

/// Outcome of interning a base path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interned {
    /// Identifier of the base path in the current segment
    pub id: u16,
    /// True the first time the path is seen in this segment
    pub is_new: bool,
}

/// Base path → identifier table for the active segment
#[derive(Debug, Default)]
pub struct PathTable {
    ids: FxHashMap<String, u16>,
    last_id: u16,
}

impl PathTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a base path up, allocating the next identifier on first sight
    ///
    /// Returns [`Error::PathTableFull`] instead of wrapping when every
    /// identifier is taken; the table is left unchanged and the caller is
    /// expected to rotate.
    pub fn intern(&mut self, base_path: &str) -> Result<Interned> {
        if let Some(&id) = self.ids.get(base_path) {
            return Ok(Interned { id, is_new: false });
        }
        if self.last_id == MAX_PATH_ID {
            return Err(Error::PathTableFull(MAX_PATH_ID as usize));
        }
        self.last_id += 1;
        self.ids.insert(base_path.to_owned(), self.last_id);
        Ok(Interned {
            id: self.last_id,
            is_new: true,
        })
    }

    /// Identifier of an already interned path
    pub fn get(&self, base_path: &str) -> Option<u16> {
        self.ids.get(base_path).copied()
    }

    /// Number of interned paths
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if no path is interned
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check if the next new path would be refused
    pub fn is_full(&self) -> bool {
        self.last_id == MAX_PATH_ID
    }

    /// Forget every path; the next new path gets identifier 1 again
    pub fn clear(&mut self) {
        self.ids.clear();
        self.last_id = 0;
    }
}
