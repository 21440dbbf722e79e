//! Per-disk writer thread with a bounded queue
//!
//! Producers call [`DiskWriter::submit`] from any thread or task. The call
//! only tries to reserve a queue slot: it never waits for file I/O and
//! returns `false` when the queue is full. One dedicated thread per disk
//! drains the queue in FIFO order and is the only code that touches the
//! disk's [`SegmentWriter`].
//!
//! ```text
//! submit() ──try_send──► [bounded queue] ──recv (timed)──► SegmentWriter::apply
//! ```
//!
//! The thread waits for the next event with a timeout taken from
//! [`SegmentWriter::idle_wait`], so a disk that goes quiet still rotates its
//! segment once it reaches the maximum age.
//!
//! Shutdown closes the queue, lets the thread apply every event that was
//! already accepted, closes the active segment and joins the thread.

use mfdlog_core::{DeleteEvent, DiskId, Error, Result};
use mfdlog_durability::{SegmentWriter, WriterStats, WriterStatsSnapshot};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Handle to one disk's writer thread
pub struct DiskWriter {
    disk: DiskId,
    tx: RwLock<Option<mpsc::Sender<DeleteEvent>>>,
    ready: Arc<AtomicBool>,
    stats: Arc<WriterStats>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DiskWriter {
    /// Start the writer thread for an opened segment writer
    ///
    /// `capacity` is the number of events that may wait in the queue.
    pub fn spawn(writer: SegmentWriter, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".into()));
        }
        let disk = writer.layout().disk().clone();
        let stats = Arc::clone(writer.stats());
        let ready = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(capacity);

        let thread_ready = Arc::clone(&ready);
        let handle = thread::Builder::new()
            .name(format!("mfd-writer-{}", disk))
            .spawn(move || drain_queue(writer, rx, thread_ready))?;

        debug!(disk = %disk, capacity, "disk writer started");
        Ok(DiskWriter {
            disk,
            tx: RwLock::new(Some(tx)),
            ready,
            stats,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Disk this writer serves
    pub fn disk(&self) -> &DiskId {
        &self.disk
    }

    /// Queue an event without waiting for I/O
    ///
    /// Returns `false` if the event cannot be encoded, the writer is shut
    /// down or has failed, or the queue is full. A rejected event is dropped.
    pub fn submit(&self, event: DeleteEvent) -> bool {
        if !event.fits_record() || !self.is_ready() {
            self.stats.incr_rejected();
            return false;
        }
        let guard = self.tx.read();
        let accepted = match guard.as_ref() {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        };
        if accepted {
            self.stats.incr_accepted();
        } else {
            self.stats.incr_rejected();
        }
        accepted
    }

    /// Check if the writer accepts events
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Counters shared with the writer thread
    pub fn stats(&self) -> &Arc<WriterStats> {
        &self.stats
    }

    /// Copy of the writer's counters
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting events, apply the queued ones and join the thread
    ///
    /// Blocks until the queue is drained. Idempotent.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::Release);
        // Dropping the only sender lets the thread see the end of the queue
        // once it has applied everything already in it.
        self.tx.write().take();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(disk = %self.disk, "disk writer thread panicked");
            }
        }
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DiskWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskWriter")
            .field("disk", &self.disk)
            .field("ready", &self.is_ready())
            .finish()
    }
}

fn drain_queue(
    mut writer: SegmentWriter,
    mut rx: mpsc::Receiver<DeleteEvent>,
    ready: Arc<AtomicBool>,
) {
    let disk = writer.layout().disk().clone();
    // Timer for the idle wake-ups; this runtime never runs other tasks.
    let runtime = match Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(disk = %disk, error = %e, "cannot start writer timer, disk is unusable");
            ready.store(false, Ordering::Release);
            rx.close();
            return;
        }
    };
    loop {
        let wait = writer.idle_wait();
        let (result, in_hand) = match runtime.block_on(timeout(wait, rx.recv())) {
            Ok(Some(event)) => (writer.apply(&event), 1),
            Ok(None) => break,
            Err(_) => (writer.rotate_if_aged().map(|_| ()), 0),
        };
        match result {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                warn!(disk = %disk, error = %e, "event skipped");
                writer.stats().add_dropped(in_hand);
            }
            Err(e) => {
                error!(disk = %disk, error = %e, "disk writer failed, disk is unusable");
                ready.store(false, Ordering::Release);
                rx.close();
                let mut dropped = in_hand;
                while rx.try_recv().is_ok() {
                    dropped += 1;
                }
                writer.stats().add_dropped(dropped);
                return;
            }
        }
    }
    writer.close();
    let stats = writer.stats().snapshot();
    info!(
        disk = %disk,
        applied = stats.events_applied,
        rotated = stats.segments_rotated,
        "disk writer drained"
    );
}
