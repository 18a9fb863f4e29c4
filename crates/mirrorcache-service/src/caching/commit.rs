//! Atomic publication of downloaded objects.
//!
//! Bytes are streamed into a uniquely named temp artifact, synced to disk,
//! and only then renamed onto the final path. Readers either see the
//! previous complete object or the new one, never partial bytes.
//!
//! Temp names are made unique per attempt from pid and nanosecond clock.
//! That is sufficient for a single process per storage root; multiple
//! processes sharing one root would need a stronger uniqueness source.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::download::ByteSource;

use super::{CacheContents, CacheError, CacheKey, StorageLayout};

/// Streams `source` into the cache location for `key`.
///
/// On success the object is durably published and the lowercase hex
/// SHA-256 of its contents is returned, with a copy persisted in the
/// sidecar. On any failure the temp artifact is removed before the error
/// is surfaced.
pub async fn commit(
    layout: &StorageLayout,
    key: &CacheKey,
    source: impl ByteSource,
) -> CacheContents<String> {
    let object_path = layout.object_path(key);
    if let Some(parent) = object_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = attempt_path(layout.temp_prefix(key));
    let result = write_and_publish(layout, key, &temp_path, source).await;

    if result.is_err() {
        // No orphans on the error path. Orphans from process crashes are
        // caught by the temp-pattern check during validation instead.
        let _ = fs::remove_file(&temp_path).await;
    }

    result
}

/// Appends the per-attempt unique suffix to the key's temp prefix.
fn attempt_path(prefix: PathBuf) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut path = prefix.into_os_string();
    path.push(format!("{}.{}", std::process::id(), nanos));
    path.into()
}

async fn write_and_publish(
    layout: &StorageLayout,
    key: &CacheKey,
    temp_path: &std::path::Path,
    mut source: impl ByteSource,
) -> CacheContents<String> {
    let mut file = fs::File::create(temp_path).await?;
    let mut hasher = Sha256::new();
    let mut written = 0u64;

    while let Some(chunk) = source.next_chunk().await? {
        hasher.update(&chunk);
        written += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }

    if let Some(expected) = source.expected_len() {
        if expected > 0 && written != expected {
            return Err(CacheError::LengthMismatch {
                expected,
                actual: written,
            });
        }
    }

    // Durability ordering: the temp file must be on disk before the rename
    // publishes it. A crash in between leaves only a temp artifact, which
    // validation classifies as incomplete.
    file.sync_all().await?;
    drop(file);

    let digest = hex::encode(hasher.finalize());

    // Best effort: a missing sidecar only degrades integrity checking to
    // trusting the file, it must not block publication.
    if let Err(err) = fs::write(layout.sidecar_path(key), &digest).await {
        tracing::warn!(key = %key, error = %err, "failed to write digest sidecar");
    }

    fs::rename(temp_path, layout.object_path(key)).await?;

    tracing::debug!(key = %key, bytes = written, digest = %digest, "object committed");
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::download::ByteSource;

    use super::*;

    struct ScriptedSource {
        chunks: std::vec::IntoIter<CacheContents<Bytes>>,
        expected_len: Option<u64>,
    }

    impl ScriptedSource {
        fn ok(data: &[u8], expected_len: Option<u64>) -> Self {
            Self {
                chunks: vec![Ok(Bytes::copy_from_slice(data))].into_iter(),
                expected_len,
            }
        }

        fn failing(data: &[u8]) -> Self {
            Self {
                chunks: vec![
                    Ok(Bytes::copy_from_slice(data)),
                    Err(CacheError::DownloadError("connection reset".into())),
                ]
                .into_iter(),
                expected_len: None,
            }
        }
    }

    impl ByteSource for ScriptedSource {
        fn expected_len(&self) -> Option<u64> {
            self.expected_len
        }

        async fn next_chunk(&mut self) -> CacheContents<Option<Bytes>> {
            self.chunks.next().transpose()
        }
    }

    fn fixture(dir: &std::path::Path) -> (StorageLayout, CacheKey) {
        let layout = StorageLayout::new(dir);
        let key = CacheKey::from_request_path("/pool/main/pkg.deb").unwrap();
        (layout, key)
    }

    fn files_in(dir: &std::path::Path) -> usize {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .count()
    }

    #[tokio::test]
    async fn test_commit_publishes_object_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, key) = fixture(dir.path());

        let digest = commit(&layout, &key, ScriptedSource::ok(b"hello", Some(5)))
            .await
            .unwrap();

        assert_eq!(digest, hex::encode(Sha256::digest(b"hello")));
        assert_eq!(std::fs::read(layout.object_path(&key)).unwrap(), b"hello");
        assert_eq!(
            std::fs::read_to_string(layout.sidecar_path(&key)).unwrap(),
            digest
        );
        // Object and sidecar only, no leftover temp artifact.
        assert_eq!(files_in(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_length_mismatch_discards_temp() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, key) = fixture(dir.path());

        let result = commit(&layout, &key, ScriptedSource::ok(b"hello", Some(10))).await;

        assert_eq!(
            result,
            Err(CacheError::LengthMismatch {
                expected: 10,
                actual: 5
            })
        );
        assert!(!layout.object_path(&key).exists());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_source_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, key) = fixture(dir.path());

        let result = commit(&layout, &key, ScriptedSource::failing(b"partial")).await;

        assert!(matches!(result, Err(CacheError::DownloadError(_))));
        assert!(!layout.object_path(&key).exists());
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_commit_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let key = CacheKey::from_request_path("/a/b/c/leaf.bin").unwrap();

        commit(&layout, &key, ScriptedSource::ok(b"leaf", None))
            .await
            .unwrap();

        assert_eq!(std::fs::read(layout.object_path(&key)).unwrap(), b"leaf");
    }
}
