//! Disk registry: one writer per disk, one relocation pool for all of them
//!
//! The registry is the only interface front-ends use. It is built once from
//! the configuration and shared by `Arc`; every method takes `&self` so any
//! number of connections can append concurrently.
//!
//! # Startup
//!
//! For every configured or discovered disk the registry opens a
//! [`SegmentWriter`] (which requeues segments left in staging and finalizes
//! a leftover active segment) and starts its [`DiskWriter`] thread. A disk
//! whose directories or active file cannot be created is logged, listed in
//! [`DiskRegistry::failed_disks`], and never registered, so appends to it
//! are rejected instead of silently lost.
//!
//! # Shutdown
//!
//! Writers are drained first, so every accepted event reaches a segment;
//! then the relocation pool stops.

use crate::routing::{discover_disks, split_request_path};
use crate::writer::DiskWriter;
use mfdlog_core::{Clock, DeleteEvent, DiskId, Error, ManagerConfig, Result, SystemClock};
use mfdlog_durability::{RelocationPool, RelocationStatsSnapshot, SegmentWriter};
use mfdlog_storage::DiskLayout;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// All disk writers of the process
pub struct DiskRegistry {
    writers: BTreeMap<DiskId, DiskWriter>,
    failed: Vec<DiskId>,
    pool: Arc<RelocationPool>,
    closed: AtomicBool,
}

impl DiskRegistry {
    /// Open every disk named by `config`
    ///
    /// Fails only on invalid configuration or if the relocation pool cannot
    /// start; unusable disks are reported through
    /// [`failed_disks`](Self::failed_disks).
    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open every disk with an explicit time source
    pub fn with_clock(config: &ManagerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(RelocationPool::new(&config.relocation)?);

        let mut writers = BTreeMap::new();
        let mut failed = Vec::new();
        for spec in discover_disks(config) {
            let layout = DiskLayout::from_config(config, &spec);
            let opened = SegmentWriter::builder(layout)
                .segment(config.segment.clone())
                .retry(config.retry.clone())
                .clock(Arc::clone(&clock))
                .sink(pool.clone())
                .open()
                .and_then(|writer| DiskWriter::spawn(writer, config.queue_capacity));
            match opened {
                Ok(writer) => {
                    info!(disk = %spec.id, mount = %spec.mount.display(), "disk registered");
                    writers.insert(spec.id, writer);
                }
                Err(e) => {
                    error!(disk = %spec.id, mount = %spec.mount.display(), error = %e, "disk unusable, not registered");
                    failed.push(spec.id);
                }
            }
        }

        if writers.is_empty() {
            warn!("no usable disks registered");
        }
        Ok(DiskRegistry {
            writers,
            failed,
            pool,
            closed: AtomicBool::new(false),
        })
    }

    /// Submit one event to a disk
    ///
    /// `true` means the event was accepted into the disk's queue; `false`
    /// means the disk is unknown or failed, the queue is full, or the
    /// registry is shutting down.
    pub fn append(&self, disk: &str, base_path: &str, relative_dir: &str) -> bool {
        match self.writer_for(disk) {
            Ok(writer) => writer.submit(DeleteEvent::new(base_path, relative_dir)),
            Err(_) => false,
        }
    }

    /// Route a full request path and submit it
    ///
    /// See [`split_request_path`] for how the path is split.
    pub fn append_path(&self, path: &str) -> bool {
        let Some(routed) = split_request_path(path) else {
            return false;
        };
        match self.writer_for(routed.disk.as_str()) {
            Ok(writer) => writer.submit(DeleteEvent::new(routed.base_path, routed.relative_dir)),
            Err(_) => false,
        }
    }

    /// The writer for `disk`
    ///
    /// Returns [`Error::UnknownDisk`] for unregistered disks and
    /// [`Error::Shutdown`] once [`shutdown`](Self::shutdown) has started.
    pub fn writer_for(&self, disk: &str) -> Result<&DiskWriter> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        self.writers
            .get(disk)
            .ok_or_else(|| Error::UnknownDisk(disk.to_owned()))
    }

    /// Registered disks, sorted
    pub fn disks(&self) -> impl Iterator<Item = &DiskId> {
        self.writers.keys()
    }

    /// Disks that could not be opened
    pub fn failed_disks(&self) -> &[DiskId] {
        &self.failed
    }

    /// Relocation counters
    pub fn relocation_stats(&self) -> RelocationStatsSnapshot {
        self.pool.stats().snapshot()
    }

    /// Block until every queued relocation has finished or `timeout` passes
    pub fn wait_relocated(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }

    /// Drain every writer, then stop the relocation pool
    ///
    /// Blocks until done. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(disks = self.writers.len(), "draining disk writers");
        for writer in self.writers.values() {
            writer.shutdown();
        }
        self.pool.shutdown();
        let stats = self.pool.stats().snapshot();
        info!(
            relocated = stats.completed,
            left_in_staging = stats.queued.saturating_sub(stats.completed),
            "registry shut down"
        );
    }
}

impl Drop for DiskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
