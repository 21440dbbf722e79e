//! Segment writer: the single owner of a disk's active segment.
//!
//! For every delete event the writer
//!
//! 1. interns the base path in the segment's [`PathTable`]
//! 2. appends a "define base path" record if the path is new to the segment
//! 3. appends the "delete entry" record
//! 4. counts the event and rotates if the segment reached `max_records`
//!    or `max_age`
//!
//! The event that reaches a threshold is written to the old segment; the
//! rotation happens right after it and the next event opens with identifiers
//! reset to 1.
//!
//! A writer that receives no events still has to honor `max_age`: its owner
//! wakes up at most every [`SegmentWriter::idle_wait`] and calls
//! [`SegmentWriter::rotate_if_aged`].
//!
//! # Rotation
//!
//! ```text
//! close active ─► ensure staging + final dirs (bounded retry, fatal)
//!     ─► rename active.mfd → active-<hex ms>.mfd (unbounded retry)
//!     ─► fsync staging dir
//!     ─► hand the finalized segment to the SegmentSink
//!     ─► open a fresh active.mfd (bounded retry, fatal)
//!     ─► reset counter, start time, path table
//! ```
//!
//! # Write failures
//!
//! Appends never give up. A short write resumes with the remaining bytes; an
//! error backs off and retries. If the active file has vanished the writer
//! rotates and replays the whole event into the new segment, so a delete
//! record never refers to an identifier defined in another segment.

use crate::relocation::{requeue_staged, RelocationJob, SegmentSink};
use crate::stats::WriterStats;
use chrono::{DateTime, Utc};
use mfdlog_core::{Clock, DeleteEvent, Error, Result, RetryConfig, SegmentConfig, SystemClock};
use mfdlog_storage::format::{encode_record, RecordKind};
use mfdlog_storage::reliable::{
    create_dir_reliable, open_segment_reliable, rename_reliable, sync_dir,
};
use mfdlog_storage::{DiskLayout, PathTable, RetryPolicy, SegmentNamer};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Whether an event's bytes reached the segment they were encoded for
enum WriteOutcome {
    Written,
    /// The active file disappeared; the writer rotated and the event must
    /// be encoded again against the new segment
    SegmentLost,
}

/// Builder for [`SegmentWriter`]
pub struct SegmentWriterBuilder {
    layout: DiskLayout,
    segment: SegmentConfig,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn SegmentSink>>,
    stats: Option<Arc<WriterStats>>,
}

impl SegmentWriterBuilder {
    /// Rotation thresholds
    pub fn segment(mut self, segment: SegmentConfig) -> Self {
        self.segment = segment;
        self
    }

    /// Retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Time source for segment age and names
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Where finalized segments go
    pub fn sink(mut self, sink: Arc<dyn SegmentSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share counters with an outside observer
    pub fn stats(mut self, stats: Arc<WriterStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Prepare the disk and open its first segment
    ///
    /// Finalized segments left in staging by a previous run are handed to
    /// the sink, a non-empty leftover `active.mfd` is finalized, and a fresh
    /// active segment is opened. Fails only if the directories or the active
    /// file cannot be created within the bounded retries; the disk is then
    /// unusable.
    pub fn open(self) -> Result<SegmentWriter> {
        let sink = self
            .sink
            .ok_or_else(|| Error::Config("segment writer needs a sink".into()))?;
        let now = self.clock.now();
        let mut writer = SegmentWriter {
            policy: RetryPolicy::from_config(&self.retry),
            layout: self.layout,
            segment: self.segment,
            retry: self.retry,
            clock: self.clock,
            sink,
            stats: self.stats.unwrap_or_default(),
            namer: SegmentNamer::new(),
            file: None,
            records: 0,
            started_at: now,
            paths: PathTable::new(),
            buf: Vec::with_capacity(1024),
        };

        create_dir_reliable(&writer.policy, writer.layout.staging_dir())?;
        let requeued = requeue_staged(&writer.layout, writer.sink.as_ref())?;
        if requeued > 0 {
            info!(disk = %writer.layout.disk(), requeued, "found finalized segments from a previous run");
        }
        writer.rotate()?;
        Ok(writer)
    }
}

/// Appends delete events to one disk's active segment
///
/// Not `Sync`: exactly one thread drives a disk's writer, which is what
/// makes the path table, counters and file handle safe without locks.
pub struct SegmentWriter {
    layout: DiskLayout,
    segment: SegmentConfig,
    retry: RetryConfig,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn SegmentSink>,
    stats: Arc<WriterStats>,
    namer: SegmentNamer,
    file: Option<File>,
    records: u64,
    started_at: DateTime<Utc>,
    paths: PathTable,
    buf: Vec<u8>,
}

impl SegmentWriter {
    /// Start building a writer for `layout`
    pub fn builder(layout: DiskLayout) -> SegmentWriterBuilder {
        SegmentWriterBuilder {
            layout,
            segment: SegmentConfig::default(),
            retry: RetryConfig::default(),
            clock: Arc::new(SystemClock),
            sink: None,
            stats: None,
        }
    }

    /// Layout of the disk this writer owns
    pub fn layout(&self) -> &DiskLayout {
        &self.layout
    }

    /// Counters
    pub fn stats(&self) -> &Arc<WriterStats> {
        &self.stats
    }

    /// Delete entries in the active segment
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// When the active segment was opened
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Base paths interned in the active segment
    pub fn interned_paths(&self) -> usize {
        self.paths.len()
    }

    /// Path of the active segment
    pub fn active_path(&self) -> PathBuf {
        self.layout.active_path()
    }

    /// Write one event
    ///
    /// Errors are either [`Error::PayloadTooLarge`] (event skipped, writer
    /// healthy) or a fatal rotation failure (disk unusable).
    pub fn apply(&mut self, event: &DeleteEvent) -> Result<()> {
        let defined = loop {
            let defined = self.encode_event(event)?;
            match self.write_buffered()? {
                WriteOutcome::Written => break defined,
                WriteOutcome::SegmentLost => {
                    debug!(disk = %self.layout.disk(), "replaying event into new segment");
                }
            }
        };

        self.records += 1;
        self.stats.incr_applied(defined);

        if self.should_rotate() {
            self.rotate()?;
        }
        Ok(())
    }

    /// Check the rotation predicate against the current clock
    pub fn should_rotate(&self) -> bool {
        if self.records >= self.segment.max_records {
            return true;
        }
        let age = self.clock.now() - self.started_at;
        chrono::Duration::from_std(self.segment.max_age_duration())
            .map(|max| age >= max)
            .unwrap_or(false)
    }

    /// How long the owner may wait for the next event before the active
    /// segment could be due for age rotation
    pub fn idle_wait(&self) -> Duration {
        let check = self.segment.idle_check_interval();
        if self.records == 0 {
            return check;
        }
        let remaining = chrono::Duration::from_std(self.segment.max_age_duration())
            .ok()
            .and_then(|max| (self.started_at + max - self.clock.now()).to_std().ok())
            .unwrap_or(Duration::ZERO);
        remaining.min(check)
    }

    /// Rotate a non-empty segment that reached a threshold while idle
    ///
    /// Returns true if a rotation happened. An empty segment is left alone
    /// so a quiet disk does not produce empty finalized files.
    pub fn rotate_if_aged(&mut self) -> Result<bool> {
        if self.records == 0 || !self.should_rotate() {
            return Ok(false);
        }
        debug!(disk = %self.layout.disk(), records = self.records, "idle segment reached max age");
        self.rotate()?;
        Ok(true)
    }

    /// Finalize the active segment and open a fresh one
    pub fn rotate(&mut self) -> Result<()> {
        // Close errors are ignored: every byte was already written with write().
        self.file.take();

        create_dir_reliable(&self.policy, self.layout.staging_dir())?;
        create_dir_reliable(&self.policy, self.layout.final_dir())?;

        let active = self.layout.active_path();
        let finalize = match fs::metadata(&active) {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(disk = %self.layout.disk(), path = %active.display(), error = %e, "cannot stat active segment, finalizing anyway");
                true
            }
        };
        if finalize {
            let name = self.namer.next_name(&self.layout, self.clock.now());
            let finalized = self.layout.staging_path(&name);
            if rename_reliable(self.retry.backoff(), &active, &finalized) {
                if let Err(e) = sync_dir(self.layout.staging_dir()) {
                    warn!(disk = %self.layout.disk(), error = %e, "cannot sync staging directory after rename");
                }
                info!(
                    disk = %self.layout.disk(),
                    segment = %name,
                    records = self.records,
                    paths = self.paths.len(),
                    "segment finalized"
                );
                self.stats.incr_rotated();
                self.sink.finalized(RelocationJob::new(&self.layout, &name));
            }
        }

        self.file = Some(open_segment_reliable(&self.policy, &active)?);
        self.records = 0;
        self.started_at = self.clock.now();
        self.paths.clear();
        Ok(())
    }

    /// Flush the active segment to stable storage and close it
    ///
    /// The segment stays in staging as `active.mfd` and is finalized by the
    /// next writer opened on this disk.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                warn!(disk = %self.layout.disk(), error = %e, "sync on close failed");
            }
        }
    }

    fn encode_event(&mut self, event: &DeleteEvent) -> Result<bool> {
        if !event.fits_record() {
            return Err(Error::PayloadTooLarge {
                len: event.base_path.len().max(event.relative_dir.len()),
                max: mfdlog_core::MAX_PAYLOAD_LEN,
            });
        }

        if self.paths.is_full() && self.paths.get(&event.base_path).is_none() {
            info!(disk = %self.layout.disk(), identifiers = self.paths.len(), "path table full, rotating early");
            self.rotate()?;
        }
        let interned = self.paths.intern(&event.base_path)?;

        self.buf.clear();
        if interned.is_new {
            encode_record(
                RecordKind::DefineBasePath,
                interned.id,
                event.base_path.as_bytes(),
                &mut self.buf,
            )?;
        }
        encode_record(
            RecordKind::DeleteEntry,
            interned.id,
            event.relative_dir.as_bytes(),
            &mut self.buf,
        )?;
        Ok(interned.is_new)
    }

    fn write_buffered(&mut self) -> Result<WriteOutcome> {
        let mut written = 0;
        let mut retries: u64 = 0;
        loop {
            let result = match self.file.as_mut() {
                Some(file) => file.write(&self.buf[written..]),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no active segment")),
            };
            match result {
                Ok(n) if n > 0 => {
                    written += n;
                    if written == self.buf.len() {
                        if retries > 0 {
                            self.stats.clear_stall();
                            info!(disk = %self.layout.disk(), retries, "write recovered");
                        }
                        return Ok(WriteOutcome::Written);
                    }
                    continue;
                }
                Ok(_) => {
                    self.note_write_retry(&mut retries, &io::ErrorKind::WriteZero.into());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(disk = %self.layout.disk(), error = %e, "active segment lost, rotating");
                    self.rotate()?;
                    self.stats.clear_stall();
                    return Ok(WriteOutcome::SegmentLost);
                }
                Err(e) => {
                    self.note_write_retry(&mut retries, &e);
                }
            }
            thread::sleep(self.retry.write_backoff());
        }
    }

    fn note_write_retry(&self, retries: &mut u64, err: &io::Error) {
        *retries += 1;
        let now = self.clock.now();
        self.stats.record_write_retry(now);
        let warn_every = self.retry.stall_warn_after.max(1);
        if *retries == 1 || *retries % warn_every == 0 {
            let stalled_ms = self
                .stats
                .stalled_for(now)
                .map(|d| d.num_milliseconds())
                .unwrap_or(0);
            if *retries == 1 {
                warn!(disk = %self.layout.disk(), error = %err, "write failed, retrying");
            } else {
                error!(
                    disk = %self.layout.disk(),
                    retries = *retries,
                    stalled_ms,
                    error = %err,
                    "disk writer stalled, still retrying"
                );
            }
        }
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        self.close();
    }
}
