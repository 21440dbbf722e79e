//! Socket front-end for mfdlog
//!
//! - protocol: length-prefixed request frames and fixed-size replies
//! - listener: Unix-socket accept loop, one task per connection
//!
//! The `mfd-manager` binary wires these to a [`DiskRegistry`] built from
//! the configuration file.
//!
//! [`DiskRegistry`]: mfdlog_engine::DiskRegistry

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod listener;
pub mod protocol;

pub use listener::{serve_connection, Listener};
pub use protocol::{read_frame, FrameError, Reply, Request, KIND_APPEND, KIND_REPLY, MAX_FRAME_LEN};
