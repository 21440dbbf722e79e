//! Counters for writers and relocation.
//!
//! Writes retry forever, so a disk whose volume goes away stalls instead of
//! losing records. These counters are how an operator notices: a writer that
//! is stuck reports when the current stall began and how many retries it
//! has burned.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

const NOT_STALLED: u64 = u64::MAX;

/// Per-disk writer counters, shared between the writer and its observers
#[derive(Debug)]
pub struct WriterStats {
    events_accepted: AtomicU64,
    events_rejected: AtomicU64,
    events_applied: AtomicU64,
    events_dropped: AtomicU64,
    define_records: AtomicU64,
    delete_records: AtomicU64,
    segments_rotated: AtomicU64,
    write_retries: AtomicU64,
    stalled_since_ms: AtomicU64,
}

/// Point-in-time copy of [`WriterStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStatsSnapshot {
    /// Events accepted into the queue
    pub events_accepted: u64,
    /// Events refused at submission (queue full, closed, too large, disk failed)
    pub events_rejected: u64,
    /// Events written to a segment
    pub events_applied: u64,
    /// Accepted events that never reached a segment
    pub events_dropped: u64,
    /// "define base path" records written
    pub define_records: u64,
    /// "delete entry" records written
    pub delete_records: u64,
    /// Segments finalized
    pub segments_rotated: u64,
    /// Write attempts that failed and were retried
    pub write_retries: u64,
    /// Unix milliseconds at which the current write stall began
    pub stalled_since_ms: Option<u64>,
}

impl Default for WriterStats {
    fn default() -> Self {
        WriterStats {
            events_accepted: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            define_records: AtomicU64::new(0),
            delete_records: AtomicU64::new(0),
            segments_rotated: AtomicU64::new(0),
            write_retries: AtomicU64::new(0),
            stalled_since_ms: AtomicU64::new(NOT_STALLED),
        }
    }
}

impl WriterStats {
    #[inline]
    pub(crate) fn incr_applied(&self, defined: bool) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
        self.delete_records.fetch_add(1, Ordering::Relaxed);
        if defined {
            self.define_records.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn incr_rotated(&self) {
        self.segments_rotated.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an event accepted into the queue
    #[inline]
    pub fn incr_accepted(&self) {
        self.events_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an event refused at submission
    #[inline]
    pub fn incr_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count accepted events that will never be written
    #[inline]
    pub fn add_dropped(&self, n: u64) {
        if n > 0 {
            self.events_dropped.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Record a failed write attempt at `now`; starts a stall if none is running
    pub(crate) fn record_write_retry(&self, now: DateTime<Utc>) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let _ = self.stalled_since_ms.compare_exchange(
            NOT_STALLED,
            now_ms,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// End the current stall, if any
    pub(crate) fn clear_stall(&self) {
        self.stalled_since_ms.store(NOT_STALLED, Ordering::Release);
    }

    /// How long the writer has been stuck retrying, measured at `now`
    pub fn stalled_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        let since = self.stalled_since_ms.load(Ordering::Acquire);
        if since == NOT_STALLED {
            return None;
        }
        let since = Utc.timestamp_millis_opt(since as i64).single()?;
        Some((now - since).max(Duration::zero()))
    }

    /// Copy every counter
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        let stalled = self.stalled_since_ms.load(Ordering::Acquire);
        WriterStatsSnapshot {
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            define_records: self.define_records.load(Ordering::Relaxed),
            delete_records: self.delete_records.load(Ordering::Relaxed),
            segments_rotated: self.segments_rotated.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            stalled_since_ms: (stalled != NOT_STALLED).then_some(stalled),
        }
    }
}

/// Relocation pool counters
#[derive(Debug, Default)]
pub struct RelocationStats {
    queued: AtomicU64,
    completed: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`RelocationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationStatsSnapshot {
    /// Segments handed to the pool
    pub queued: u64,
    /// Segments now in the final store and gone from staging
    pub completed: u64,
    /// Attempts that failed and were restarted
    pub failed_attempts: u64,
    /// Segments left in staging because the pool shut down first
    pub abandoned: u64,
}

impl RelocationStats {
    // Queued is counted before the job reaches a worker, and finished jobs
    // are published with Release, so a snapshot never shows more finished
    // segments than queued ones.
    #[inline]
    pub(crate) fn incr_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn decr_queued(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_completed(&self) {
        self.completed.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub(crate) fn incr_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Release);
    }

    /// Segments queued but neither completed nor abandoned
    pub fn pending(&self) -> u64 {
        let s = self.snapshot();
        s.queued.saturating_sub(s.completed + s.abandoned)
    }

    /// Copy every counter
    pub fn snapshot(&self) -> RelocationStatsSnapshot {
        let completed = self.completed.load(Ordering::Acquire);
        let abandoned = self.abandoned.load(Ordering::Acquire);
        RelocationStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            completed,
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            abandoned,
        }
    }
}
