//! Aggregate statistics over the storage tree.

use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

/// Counts over everything currently stored below the storage root,
/// including sidecars and any in-flight temp artifacts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StorageStats {
    pub cached_files: u64,
    pub total_bytes: u64,
}

/// Walks the storage tree and sums up file counts and sizes.
///
/// A read-only observer of the storage layout; unreadable entries are
/// skipped.
pub fn collect(root: &Path) -> StorageStats {
    let mut stats = StorageStats::default();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            stats.cached_files += 1;
            stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }

    stats
}
