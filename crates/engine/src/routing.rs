//! Disk discovery and request-path routing
//!
//! Request paths look like `/<disk>/<a>/<b>/<rest...>`. The first component
//! names the disk. The base path is the disk plus two more components, or
//! plus five more for `remote_data` trees, whose layout is deeper:
//!
//! ```text
//! /data3/ns/bucket/x/y            → disk data3, base /data3/ns/bucket, dir /x/y
//! /data3/remote_data/a/b/c/d/x/y  → disk data3, base /data3/remote_data/a/b/c/d, dir /x/y
//! ```
//!
//! The relative directory keeps its leading `/` so that `base + dir` is the
//! full path again.

use mfdlog_core::{DiskId, DiskSpec, ManagerConfig};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Second component that selects the deep base-path layout
pub const REMOTE_DATA: &str = "remote_data";

const BASE_COMPONENTS: usize = 3;
const REMOTE_BASE_COMPONENTS: usize = 6;

/// A request path split into its routing parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPath {
    /// Target disk
    pub disk: DiskId,
    /// Base path, interned per segment
    pub base_path: String,
    /// Directory below the base path, starting with `/`
    pub relative_dir: String,
}

/// Split a full request path
///
/// Returns `None` if the path is relative, contains `..`, or has nothing
/// below its base path. Empty components (`//`) are ignored.
pub fn split_request_path(path: &str) -> Option<RoutedPath> {
    if !path.starts_with('/') {
        return None;
    }
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.iter().any(|p| *p == "..") {
        return None;
    }

    let base_len = if parts.get(1) == Some(&REMOTE_DATA) {
        REMOTE_BASE_COMPONENTS
    } else {
        BASE_COMPONENTS
    };
    if parts.len() <= base_len {
        return None;
    }

    Some(RoutedPath {
        disk: DiskId::new(parts[0]),
        base_path: format!("/{}", parts[..base_len].join("/")),
        relative_dir: format!("/{}", parts[base_len..].join("/")),
    })
}

/// Disks to register: the explicit list, then every discovered mount
///
/// Discovery probes `<prefix>1 ..= <prefix><max_index>` and keeps the
/// existing directories; a discovered disk is named after the last
/// component of its mount (`/data7` → `data7`). Explicitly configured ids
/// win over discovered ones.
pub fn discover_disks(config: &ManagerConfig) -> Vec<DiskSpec> {
    let mut disks = config.disks.clone();
    let mut seen: BTreeSet<DiskId> = disks.iter().map(|d| d.id.clone()).collect();

    if let Some(discovery) = &config.discovery {
        for index in 1..=discovery.max_index {
            let mount = PathBuf::from(format!("{}{}", discovery.prefix, index));
            if !mount.is_dir() {
                continue;
            }
            let id = match mount.file_name().and_then(|n| n.to_str()) {
                Some(name) => DiskId::new(name),
                None => continue,
            };
            if seen.insert(id.clone()) {
                debug!(disk = %id, mount = %mount.display(), "discovered disk");
                disks.push(DiskSpec { id, mount });
            }
        }
    }
    disks
}
