//! Filesystem operations with retry.
//!
//! Each operation has a fixed policy:
//!
//! | Operation | Retry | On exhaustion |
//! |-----------|-------|---------------|
//! | create staging/final directory | fixed backoff, bounded | `Error::RetriesExhausted` (disk unusable) |
//! | open a fresh active segment | fixed backoff, bounded | `Error::RetriesExhausted` (disk unusable) |
//! | rename active → finalized | fixed backoff, unbounded | n/a |
//!
//! A rename only survives a power loss once the directory holding the new
//! name has been synced; [`sync_dir`] does that and callers run it before
//! they delete anything the rename was meant to replace.
//!
//! Appends have their own unbounded loop in the segment writer because they
//! interact with rotation.

use mfdlog_core::{Error, Result, RetryConfig};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Consecutive rename failures between warnings
const RENAME_WARN_EVERY: u64 = 100;

/// Bounded retry policy: `attempts` tries, `backoff` between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, at least one
    pub attempts: u32,
    /// Sleep between tries
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        RetryPolicy {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Policy for bounded operations from the retry configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy::new(config.attempts, config.backoff())
    }

    /// Run `op` until it succeeds or the attempts are used up
    pub fn run<T>(
        &self,
        operation: &'static str,
        path: &Path,
        mut op: impl FnMut() -> io::Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, path = %path.display(), attempt, "succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.attempts => {
                    debug!(operation, path = %path.display(), attempt, error = %err, "retrying");
                    attempt += 1;
                    thread::sleep(self.backoff);
                }
                Err(err) => {
                    warn!(operation, path = %path.display(), attempt, error = %err, "giving up");
                    return Err(Error::RetriesExhausted {
                        operation,
                        path: path.to_path_buf(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

/// Create `dir` and its parents, retrying per `policy`
pub fn create_dir_reliable(policy: &RetryPolicy, dir: &Path) -> Result<()> {
    policy.run("create directory", dir, || fs::create_dir_all(dir))
}

/// Open `path` for appending, creating it if needed, retrying per `policy`
pub fn open_segment_reliable(policy: &RetryPolicy, path: &Path) -> Result<File> {
    policy.run("open segment", path, || {
        OpenOptions::new().create(true).append(true).open(path)
    })
}

/// Rename `from` to `to`, retrying forever on failure
///
/// Returns `false` without renaming if `from` does not exist, which is the
/// only condition retrying cannot fix. Every other error is taken to be
/// transient contention.
pub fn rename_reliable(backoff: Duration, from: &Path, to: &Path) -> bool {
    let mut failures: u64 = 0;
    loop {
        match fs::rename(from, to) {
            Ok(()) => return true,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !from.exists() => return false,
            Err(e) => {
                failures += 1;
                if failures % RENAME_WARN_EVERY == 1 {
                    warn!(
                        from = %from.display(),
                        to = %to.display(),
                        failures,
                        error = %e,
                        "rename failing, still retrying"
                    );
                }
                thread::sleep(backoff);
            }
        }
    }
}

/// Fsync a directory so entries created or renamed in it are durable
///
/// A no-op where directories cannot be opened for syncing.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
