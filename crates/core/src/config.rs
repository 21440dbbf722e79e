//! Configuration for the manager, its disks, and their segment writers.
//!
//! Loaded from TOML; every field has a default so an empty file is a valid
//! configuration that reproduces the stock deployment:
//!
//! ```toml
//! staging_root = "/opt/e2-mfd-manager/mfd-manager-files"
//! queue_capacity = 4096
//!
//! [discovery]
//! prefix = "/data"
//! max_index = 119
//!
//! [segment]
//! base_name = "active"
//! max_records = 20000
//! max_age_secs = 600
//! idle_check_ms = 1000
//!
//! [[disks]]
//! id = "scratch"
//! mount = "/mnt/scratch"
//! ```

use crate::error::{Error, Result};
use crate::types::DiskId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Root of the per-disk staging directories
    pub staging_root: PathBuf,
    /// Directory under each disk mount that receives relocated segments
    pub final_subdir: String,
    /// Explicitly configured disks
    pub disks: Vec<DiskSpec>,
    /// Probe for `<prefix>N` mount points at startup
    pub discovery: Option<DiscoveryConfig>,
    /// Rotation thresholds and file naming
    pub segment: SegmentConfig,
    /// Capacity of each disk's event queue
    pub queue_capacity: usize,
    /// Filesystem retry policy
    pub retry: RetryConfig,
    /// Relocation worker pool
    pub relocation: RelocationConfig,
    /// Unix socket the front-end listens on
    pub socket_path: PathBuf,
    /// Permission bits applied to the socket file
    pub socket_mode: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            staging_root: PathBuf::from("/opt/e2-mfd-manager/mfd-manager-files"),
            final_subdir: "mfd-manager-files".to_string(),
            disks: Vec::new(),
            discovery: Some(DiscoveryConfig::default()),
            segment: SegmentConfig::default(),
            queue_capacity: 4096,
            retry: RetryConfig::default(),
            relocation: RelocationConfig::default(),
            socket_path: PathBuf::from("/tmp/e2-mfd-uds"),
            socket_mode: 0o770,
        }
    }
}

impl ManagerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ManagerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that cannot make progress
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.final_subdir.is_empty() {
            return Err(Error::Config("final_subdir must not be empty".into()));
        }
        self.segment.validate()?;
        if self.relocation.workers == 0 {
            return Err(Error::Config("relocation.workers must be at least 1".into()));
        }
        for (i, disk) in self.disks.iter().enumerate() {
            if self.disks[..i].iter().any(|d| d.id == disk.id) {
                return Err(Error::Config(format!("disk {} configured twice", disk.id)));
            }
        }
        Ok(())
    }

    /// Staging directory for a disk
    pub fn staging_dir(&self, disk: &DiskId) -> PathBuf {
        self.staging_root.join(disk.as_str())
    }

    /// Final store directory for a disk mounted at `mount`
    pub fn final_dir(&self, mount: &Path) -> PathBuf {
        mount.join(&self.final_subdir)
    }

    /// Set the staging root
    pub fn staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    /// Add an explicit disk
    pub fn disk(mut self, id: impl Into<DiskId>, mount: impl Into<PathBuf>) -> Self {
        self.disks.push(DiskSpec {
            id: id.into(),
            mount: mount.into(),
        });
        self
    }

    /// Turn mount-point discovery off
    pub fn without_discovery(mut self) -> Self {
        self.discovery = None;
        self
    }
}

/// A disk: its identifier and where it is mounted
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskSpec {
    /// Identifier used for routing and the staging directory name
    pub id: DiskId,
    /// Mount point; the final store lives underneath it
    pub mount: PathBuf,
}

/// Mount-point discovery: probes `<prefix>1 ..= <prefix><max_index>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Path prefix, e.g. `/data`
    pub prefix: String,
    /// Highest index probed
    pub max_index: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            prefix: "/data".to_string(),
            max_index: 119,
        }
    }
}

/// Segment rotation thresholds and naming
///
/// A segment rotates once it holds `max_records` delete entries or once it
/// has been open for `max_age_secs`, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentConfig {
    /// Stem of the active file and of finalized names
    pub base_name: String,
    /// Delete entries per segment
    pub max_records: u64,
    /// Maximum segment age in seconds
    pub max_age_secs: u64,
    /// Longest an idle writer sleeps before checking its segment's age
    pub idle_check_ms: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            base_name: "active".to_string(),
            max_records: 20_000,
            max_age_secs: 600,
            idle_check_ms: 1000,
        }
    }
}

impl SegmentConfig {
    /// Set the record threshold
    pub fn max_records(mut self, n: u64) -> Self {
        self.max_records = n;
        self
    }

    /// Set the age threshold
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age_secs = age.as_secs();
        self
    }

    /// Age threshold as a duration
    pub fn max_age_duration(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Set the idle wake-up interval
    pub fn idle_check(mut self, interval: Duration) -> Self {
        self.idle_check_ms = interval.as_millis() as u64;
        self
    }

    /// Idle wake-up interval, at least one millisecond
    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_ms.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(Error::Config("segment.max_records must be at least 1".into()));
        }
        if self.base_name.is_empty() || self.base_name.contains('/') {
            return Err(Error::Config(format!(
                "segment.base_name {:?} is not a valid file stem",
                self.base_name
            )));
        }
        Ok(())
    }
}

/// Filesystem retry policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts for bounded operations (directory and file creation)
    pub attempts: u32,
    /// Backoff between bounded attempts and rename retries, in milliseconds
    pub backoff_ms: u64,
    /// Backoff between write retries, in milliseconds
    pub write_backoff_ms: u64,
    /// Consecutive write retries between stall warnings
    pub stall_warn_after: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempts: 20,
            backoff_ms: 10,
            write_backoff_ms: 100,
            stall_warn_after: 50,
        }
    }
}

impl RetryConfig {
    /// Backoff for bounded operations and renames
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Backoff for write retries
    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }
}

/// Relocation worker pool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelocationConfig {
    /// Worker threads shared by all disks
    pub workers: usize,
    /// Delay before a failed relocation starts over, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        RelocationConfig {
            workers: 4,
            retry_delay_ms: 10_000,
        }
    }
}

impl RelocationConfig {
    /// Delay before a failed relocation starts over
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
