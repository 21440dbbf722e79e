//! Moving finalized segments from staging to the final store.
//!
//! Staging and the final store may sit on different volumes, so a segment is
//! never renamed across them. Each attempt runs:
//!
//! ```text
//! open source ─► create <name>.tmp in final store ─► copy ─► fsync
//!     ─► rename <name>.tmp → <name> ─► fsync final store dir ─► delete source
//! ```
//!
//! The source is only deleted once the rename is on disk, so a power loss
//! at any point leaves the segment in staging or under its final name.
//!
//! Any failing step throws the attempt away and starts over after a fixed
//! delay. An interrupted attempt leaves either a `.tmp` file (overwritten by
//! the next attempt, never visible under the final name) or the source still
//! in staging (retried, also after a restart via [`requeue_staged`]). Readers
//! of the final store never see a partial segment.
//!
//! Relocation runs on a fixed-size [`RelocationPool`] shared by every disk.

use crate::stats::RelocationStats;
use mfdlog_core::{DiskId, RelocationConfig, Result};
use mfdlog_storage::{sync_dir, DiskLayout};
use parking_lot::{Condvar, Mutex};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receives segments as they are finalized
///
/// The segment writer calls this once per finalized segment, from its own
/// thread. Implementations must not block for long: the disk's writer is
/// stalled until they return.
pub trait SegmentSink: Send + Sync {
    /// Take ownership of a finalized segment
    fn finalized(&self, job: RelocationJob);
}

/// One finalized segment and where it has to go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationJob {
    /// Disk the segment belongs to
    pub disk: DiskId,
    /// Finalized segment in staging
    pub source: PathBuf,
    /// Temporary name in the final store
    pub tmp: PathBuf,
    /// Final name in the final store
    pub dest: PathBuf,
}

impl RelocationJob {
    /// Job for the finalized segment `name` of `layout`
    pub fn new(layout: &DiskLayout, name: &str) -> Self {
        RelocationJob {
            disk: layout.disk().clone(),
            source: layout.staging_path(name),
            tmp: layout.tmp_path(name),
            dest: layout.final_path(name),
        }
    }

    /// Job for a finalized segment found at `source` in staging
    pub fn from_staged(layout: &DiskLayout, source: &Path) -> Option<Self> {
        let name = source.file_name()?.to_str()?;
        Some(RelocationJob::new(layout, name))
    }
}

/// Result of one relocation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateOutcome {
    /// Segment is in the final store and gone from staging
    Relocated {
        /// Bytes copied
        bytes: u64,
    },
    /// Source no longer exists; an earlier attempt already finished
    SourceMissing,
}

/// Run one relocation attempt
///
/// On error, a temporary destination file created by this attempt is removed
/// on a best-effort basis; the next attempt truncates it either way.
pub fn relocate_once(job: &RelocationJob) -> io::Result<RelocateOutcome> {
    relocate_with(job, sync_dir)
}

fn relocate_with(
    job: &RelocationJob,
    sync_dir: impl Fn(&Path) -> io::Result<()>,
) -> io::Result<RelocateOutcome> {
    let mut source = match File::open(&job.source) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(RelocateOutcome::SourceMissing)
        }
        Err(e) => return Err(e),
    };

    let copied = (|| {
        let mut tmp = File::create(&job.tmp)?;
        let bytes = io::copy(&mut source, &mut tmp)?;
        tmp.sync_all()?;
        Ok::<_, io::Error>(bytes)
    })();
    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&job.tmp);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&job.tmp, &job.dest) {
        let _ = fs::remove_file(&job.tmp);
        return Err(e);
    }
    drop(source);
    if let Some(final_dir) = job.dest.parent() {
        sync_dir(final_dir)?;
    }

    match fs::remove_file(&job.source) {
        Ok(()) => {}
        // Someone else finished the same segment; the destination is complete either way.
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(RelocateOutcome::Relocated { bytes })
}

/// Cooperative shutdown flag that sleepers can wait on
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger shutdown and wake every waiter
    pub fn trigger(&self) {
        *self.triggered.lock() = true;
        self.cv.notify_all();
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }

    /// Sleep for `timeout` or until triggered; returns true if triggered
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut triggered = self.triggered.lock();
        if !*triggered {
            self.cv.wait_for(&mut triggered, timeout);
        }
        *triggered
    }
}

/// Relocate `job`, restarting from scratch after `retry_delay` until it
/// succeeds or `shutdown` fires. Returns true once the segment is relocated.
pub fn relocate_until_done(
    job: &RelocationJob,
    retry_delay: Duration,
    shutdown: &ShutdownSignal,
    stats: &RelocationStats,
) -> bool {
    let mut attempt: u64 = 1;
    loop {
        match relocate_once(job) {
            Ok(RelocateOutcome::Relocated { bytes }) => {
                info!(
                    disk = %job.disk,
                    source = %job.source.display(),
                    dest = %job.dest.display(),
                    bytes,
                    attempt,
                    "segment relocated"
                );
                stats.incr_completed();
                return true;
            }
            Ok(RelocateOutcome::SourceMissing) => {
                debug!(disk = %job.disk, source = %job.source.display(), "segment already relocated");
                stats.incr_completed();
                return true;
            }
            Err(e) => {
                stats.incr_failed_attempt();
                warn!(
                    disk = %job.disk,
                    source = %job.source.display(),
                    dest = %job.dest.display(),
                    attempt,
                    error = %e,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    "relocation failed"
                );
            }
        }
        if shutdown.wait_timeout(retry_delay) {
            stats.incr_abandoned();
            info!(disk = %job.disk, source = %job.source.display(), "relocation abandoned for shutdown, segment stays in staging");
            return false;
        }
        attempt += 1;
    }
}

/// Fixed-size pool of relocation workers fed by an unbounded FIFO
///
/// The FIFO holds paths, not data, so queueing is cheap; concurrency on the
/// volumes is capped by the number of workers. Every queued segment is
/// retried until relocated, or left in staging for the next start if the
/// pool shuts down first.
pub struct RelocationPool {
    tx: Mutex<Option<mpsc::UnboundedSender<RelocationJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<ShutdownSignal>,
    stats: Arc<RelocationStats>,
}

impl RelocationPool {
    /// Start `config.workers` worker threads
    pub fn new(config: &RelocationConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<RelocationJob>();
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = Arc::new(ShutdownSignal::new());
        let stats = Arc::new(RelocationStats::default());
        let retry_delay = config.retry_delay();

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let shutdown = Arc::clone(&shutdown);
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("mfd-relocate-{}", i))
                .spawn(move || worker_loop(rx, retry_delay, shutdown, stats))?;
            workers.push(handle);
        }

        Ok(RelocationPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            shutdown,
            stats,
        })
    }

    /// Pool counters
    pub fn stats(&self) -> &Arc<RelocationStats> {
        &self.stats
    }

    /// Queue a segment for relocation
    ///
    /// Returns false if the pool is already shut down; the segment then
    /// stays in staging until the next start.
    pub fn submit(&self, job: RelocationJob) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            warn!(disk = %job.disk, source = %job.source.display(), "relocation pool stopped, segment stays in staging");
            return false;
        };
        self.stats.incr_queued();
        match tx.send(job) {
            Ok(()) => true,
            Err(mpsc::error::SendError(job)) => {
                self.stats.decr_queued();
                warn!(disk = %job.disk, source = %job.source.display(), "relocation pool stopped, segment stays in staging");
                false
            }
        }
    }

    /// Block until nothing is queued or in flight, or until `timeout` passes
    ///
    /// Returns true if the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.stats.pending() > 0 {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Stop accepting work, abandon retries, and join the workers
    ///
    /// Attempts already running finish; segments still queued or waiting to
    /// retry stay in staging. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
        self.tx.lock().take();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("relocation worker panicked");
            }
        }
    }
}

impl SegmentSink for RelocationPool {
    fn finalized(&self, job: RelocationJob) {
        self.submit(job);
    }
}

impl Drop for RelocationPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    rx: Arc<Mutex<mpsc::UnboundedReceiver<RelocationJob>>>,
    retry_delay: Duration,
    shutdown: Arc<ShutdownSignal>,
    stats: Arc<RelocationStats>,
) {
    loop {
        let job = rx.lock().blocking_recv();
        let Some(job) = job else { break };
        if shutdown.is_triggered() {
            stats.incr_abandoned();
            continue;
        }
        relocate_until_done(&job, retry_delay, &shutdown, &stats);
    }
}

/// Queue every finalized segment already sitting in `layout`'s staging area
///
/// Called once per disk at startup, before the disk's first rotation, so a
/// segment is never queued twice.
pub fn requeue_staged(layout: &DiskLayout, sink: &dyn SegmentSink) -> io::Result<usize> {
    let staged = layout.list_finalized()?;
    let mut queued = 0;
    for path in staged {
        if let Some(job) = RelocationJob::from_staged(layout, &path) {
            info!(disk = %job.disk, source = %job.source.display(), "requeueing segment left in staging");
            sink.finalized(job);
            queued += 1;
        }
    }
    Ok(queued)
}

/// Sink that keeps finalized segments in memory instead of relocating them
///
/// For tooling that inspects staging, and for tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    jobs: Mutex<Vec<RelocationJob>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments received so far, in order
    pub fn jobs(&self) -> Vec<RelocationJob> {
        self.jobs.lock().clone()
    }

    /// Take the received segments, leaving the sink empty
    pub fn take(&self) -> Vec<RelocationJob> {
        std::mem::take(&mut *self.jobs.lock())
    }
}

impl SegmentSink for CollectingSink {
    fn finalized(&self, job: RelocationJob) {
        self.jobs.lock().push(job);
    }
}
