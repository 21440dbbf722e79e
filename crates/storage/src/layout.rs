//! Per-disk directory layout and segment file names.
//!
//! ```text
//! <staging_root>/<disk>/active.mfd              active segment
//! <staging_root>/<disk>/active-<hex ms>.mfd     finalized, awaiting relocation
//! <mount>/mfd-manager-files/active-<hex ms>.mfd relocated
//! <mount>/mfd-manager-files/active-<hex ms>.mfd.tmp  relocation in progress
//! ```

use chrono::{DateTime, Utc};
use mfdlog_core::{DiskId, DiskSpec, ManagerConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of every segment file
pub const SEGMENT_EXTENSION: &str = "mfd";

/// Extension appended to a relocation's destination while it is copied
pub const TMP_EXTENSION: &str = "tmp";

/// Where one disk's segments live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLayout {
    disk: DiskId,
    staging_dir: PathBuf,
    final_dir: PathBuf,
    base_name: String,
}

impl DiskLayout {
    /// Build a layout from explicit directories
    pub fn new(
        disk: DiskId,
        staging_dir: impl Into<PathBuf>,
        final_dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
    ) -> Self {
        DiskLayout {
            disk,
            staging_dir: staging_dir.into(),
            final_dir: final_dir.into(),
            base_name: base_name.into(),
        }
    }

    /// Build the layout the configuration prescribes for `spec`
    pub fn from_config(config: &ManagerConfig, spec: &DiskSpec) -> Self {
        DiskLayout::new(
            spec.id.clone(),
            config.staging_dir(&spec.id),
            config.final_dir(&spec.mount),
            config.segment.base_name.clone(),
        )
    }

    /// Disk this layout belongs to
    pub fn disk(&self) -> &DiskId {
        &self.disk
    }

    /// Staging directory
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Final store directory
    pub fn final_dir(&self) -> &Path {
        &self.final_dir
    }

    /// Stem shared by the active file and finalized names
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Path of the active segment
    pub fn active_path(&self) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{}", self.base_name, SEGMENT_EXTENSION))
    }

    /// File name of a finalized segment with the given suffix
    pub fn finalized_name(&self, suffix: u64) -> String {
        format!("{}-{:x}.{}", self.base_name, suffix, SEGMENT_EXTENSION)
    }

    /// Path of a finalized segment in staging
    pub fn staging_path(&self, name: &str) -> PathBuf {
        self.staging_dir.join(name)
    }

    /// Path of a relocated segment in the final store
    pub fn final_path(&self, name: &str) -> PathBuf {
        self.final_dir.join(name)
    }

    /// Temporary path a relocation copies into before its atomic rename
    pub fn tmp_path(&self, name: &str) -> PathBuf {
        self.final_dir.join(format!("{}.{}", name, TMP_EXTENSION))
    }

    /// Check if `name` is a finalized segment name for this layout
    pub fn is_finalized_name(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(self.base_name.as_str()) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix('-') else {
            return false;
        };
        let Some(hex) = rest
            .strip_suffix(SEGMENT_EXTENSION)
            .and_then(|r| r.strip_suffix('.'))
        else {
            return false;
        };
        !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Finalized segments currently in staging, oldest name first
    ///
    /// A missing staging directory simply has no segments.
    pub fn list_finalized(&self) -> io::Result<Vec<PathBuf>> {
        self.list_segments(&self.staging_dir)
    }

    /// Segments already relocated into the final store, oldest name first
    ///
    /// Temporary files of in-flight relocations are not included.
    pub fn list_relocated(&self) -> io::Result<Vec<PathBuf>> {
        self.list_segments(&self.final_dir)
    }

    fn list_segments(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if self.is_finalized_name(name) {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort_by_key(|n| finalized_suffix(n));
        Ok(names.into_iter().map(|n| dir.join(n)).collect())
    }
}

fn finalized_suffix(name: &str) -> u64 {
    name.rsplit_once('-')
        .and_then(|(_, tail)| tail.split('.').next())
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .unwrap_or(0)
}

/// Hands out unique, increasing finalized-segment names for one disk
///
/// The suffix is the hex Unix time in milliseconds. Two rotations within the
/// same millisecond, a clock stepping backwards, or a name already present in
/// staging or the final store all bump the suffix until it is unique.
#[derive(Debug, Default)]
pub struct SegmentNamer {
    last_suffix: Option<u64>,
}

impl SegmentNamer {
    /// Create a namer with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Next finalized name for `layout` at time `now`
    pub fn next_name(&mut self, layout: &DiskLayout, now: DateTime<Utc>) -> String {
        let mut suffix = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        if let Some(last) = self.last_suffix {
            suffix = suffix.max(last.saturating_add(1));
        }
        loop {
            let name = layout.finalized_name(suffix);
            if !layout.staging_path(&name).exists() && !layout.final_path(&name).exists() {
                self.last_suffix = Some(suffix);
                return name;
            }
            suffix = suffix.saturating_add(1);
        }
    }
}
