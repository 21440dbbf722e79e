//! Error types shared across mfdlog.
//!
//! Only a handful of these ever leave the core: filesystem failures are
//! absorbed by the writer, rotator and relocator, and callers of `append`
//! only see accept/reject. The variants exist so the layers can talk to each
//! other and so startup can report an unusable disk.

use std::path::PathBuf;
use thiserror::Error;

/// All mfdlog errors.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or failed validation
    #[error("config error: {0}")]
    Config(String),

    /// Record bytes are not a well-formed record
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Payload does not fit the 16-bit length field
    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Length of the rejected payload
        len: usize,
        /// Largest encodable payload
        max: usize,
    },

    /// Every identifier of the current segment is taken
    #[error("path table full: all {0} identifiers in use")]
    PathTableFull(usize),

    /// A bounded retry loop gave up
    #[error("{operation} failed after {attempts} attempts on {path}: {source}")]
    RetriesExhausted {
        /// Operation that was retried
        operation: &'static str,
        /// Path the operation targeted
        path: PathBuf,
        /// Attempts made before giving up
        attempts: u32,
        /// Last error seen
        #[source]
        source: std::io::Error,
    },

    /// No writer is registered for the disk
    #[error("unknown disk: {0}")]
    UnknownDisk(String),

    /// Component is shutting down or already shut down
    #[error("shutting down")]
    Shutdown,
}

/// Result type for mfdlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error makes a disk unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RetriesExhausted { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
