//! Shared helpers for integration tests.

#![allow(dead_code)]

pub use mfdlog::prelude::*;
pub use mfdlog_durability::{CollectingSink, RelocationJob, RelocationPool, ShutdownSignal};
pub use mfdlog_storage::encode_record;
pub use std::fs;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};

use tempfile::TempDir;

/// A scratch root holding a staging area and one mount directory per disk
pub struct TestDisks {
    pub dir: TempDir,
}

impl TestDisks {
    pub fn new() -> Self {
        TestDisks {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn mount(&self, disk: &str) -> PathBuf {
        self.root().join(disk)
    }

    /// Configuration with explicit disks, fast retries, fast idle checks
    /// and a small pool
    pub fn config(&self, disks: &[&str]) -> ManagerConfig {
        let mut config = ManagerConfig::default()
            .without_discovery()
            .staging_root(self.root().join("staging"));
        for disk in disks {
            config = config.disk(*disk, self.mount(disk));
        }
        config.segment.idle_check_ms = 5;
        config.retry = RetryConfig {
            attempts: 3,
            backoff_ms: 1,
            write_backoff_ms: 1,
            stall_warn_after: 10,
        };
        config.relocation = RelocationConfig {
            workers: 2,
            retry_delay_ms: 10,
        };
        config
    }

    pub fn layout(&self, config: &ManagerConfig, disk: &str) -> DiskLayout {
        let spec = DiskSpec {
            id: DiskId::new(disk),
            mount: self.mount(disk),
        };
        DiskLayout::from_config(config, &spec)
    }

    /// File names in a directory, sorted; empty if it does not exist
    pub fn names_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

/// Decode every segment in `paths`, in order
pub fn read_segments(paths: &[PathBuf]) -> Vec<Vec<Record>> {
    paths
        .iter()
        .map(|p| decode_all(&fs::read(p).unwrap()).unwrap())
        .collect()
}

/// Rebuild (base path, relative dir) pairs from a segment's records
pub fn events_of(records: &[Record]) -> Vec<(String, String)> {
    let mut bases: Vec<String> = Vec::new();
    let mut events = Vec::new();
    for record in records {
        match record.kind {
            RecordKind::DefineBasePath => {
                assert_eq!(record.path_id as usize, bases.len() + 1);
                bases.push(record.payload_str().unwrap().to_owned());
            }
            RecordKind::DeleteEntry => {
                let base = &bases[record.path_id as usize - 1];
                events.push((base.clone(), record.payload_str().unwrap().to_owned()));
            }
        }
    }
    events
}

/// Poll `check` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
