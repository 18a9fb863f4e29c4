//! Completeness and integrity checking of cached objects.
//!
//! A missing digest sidecar is treated as trusting an otherwise
//! structurally sound file. That is a known tradeoff: corruption of an
//! object that never got its sidecar written goes undetected, in exchange
//! for never blocking availability on sidecar bookkeeping.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use super::{CacheKey, StorageLayout};

/// Classification of the on-disk state for one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// The object exists, is verified, and can be served directly.
    Complete,
    /// The object is missing, currently being filled, or was just removed
    /// because it failed verification. A fill is needed.
    Incomplete,
}

impl ObjectState {
    pub fn is_complete(self) -> bool {
        matches!(self, ObjectState::Complete)
    }
}

/// Decides whether the object for `key` is usable as-is.
///
/// Corrupt entries (sidecar digest mismatch, or an object that cannot be
/// read back) are deleted here, so the next request for the key starts a
/// fresh fill from a clean slate. The check has no side effects on valid
/// entries and is safe to run any number of times.
pub async fn check(layout: &StorageLayout, key: &CacheKey) -> ObjectState {
    let object_path = layout.object_path(key);

    let Ok(metadata) = fs::metadata(&object_path).await else {
        return ObjectState::Incomplete;
    };
    if metadata.is_dir() || metadata.len() == 0 {
        return ObjectState::Incomplete;
    }

    // A temp artifact next to the object means a fill is in flight or died
    // mid-write. Never trust the object while one exists.
    if has_temp_artifact(layout, key).await {
        return ObjectState::Incomplete;
    }

    let sidecar_path = layout.sidecar_path(key);
    let Ok(expected) = fs::read_to_string(&sidecar_path).await else {
        // No sidecar: trust the file.
        return ObjectState::Complete;
    };

    let matches = match file_digest(&object_path).await {
        Ok(actual) => actual == expected.trim(),
        Err(_) => false,
    };

    if !matches {
        tracing::warn!(
            key = %key,
            "digest mismatch, removing corrupt object and sidecar"
        );
        let _ = fs::remove_file(&object_path).await;
        let _ = fs::remove_file(&sidecar_path).await;
        return ObjectState::Incomplete;
    }

    ObjectState::Complete
}

/// Looks for any `<object>.tmp.*` sibling of the object.
async fn has_temp_artifact(layout: &StorageLayout, key: &CacheKey) -> bool {
    let object_path = layout.object_path(key);
    let (Some(parent), Some(name)) = (object_path.parent(), object_path.file_name()) else {
        return false;
    };

    let mut prefix = name.to_os_string();
    prefix.push(".tmp.");

    let Ok(mut entries) = fs::read_dir(parent).await else {
        return false;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry
            .file_name()
            .as_encoded_bytes()
            .starts_with(prefix.as_encoded_bytes())
        {
            return true;
        }
    }

    false
}

/// Streams the whole file and returns its lowercase hex SHA-256.
async fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
