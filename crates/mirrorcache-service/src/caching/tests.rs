//! Scenario tests for the cache fill protocol, driven through the public
//! [`CacheService`] entry point against a mock origin.

use std::path::Path;
use std::time::Duration;

use mirrorcache_test as test;
use sha2::{Digest, Sha256};

use crate::caching::{CacheError, CacheKey, ObjectState, StorageLayout, check};
use crate::config::Config;
use crate::service::{CacheService, Disposition};
use crate::stats;

fn test_config(storage: &Path, upstream: &test::Upstream) -> Config {
    Config {
        storage_dir: storage.to_path_buf(),
        upstream: upstream.url(),
        ..Config::default()
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[tokio::test]
async fn test_fetch_stores_object_and_sidecar() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();
    upstream.insert("/foo/bar.iso", &b"iso contents"[..]);

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let first = service.fetch_cached("/foo/bar.iso").await.unwrap();
    assert_eq!(first.disposition, Disposition::Stored);
    assert_eq!(first.path, storage.path().join("foo/bar.iso"));
    assert_eq!(std::fs::read(&first.path).unwrap(), b"iso contents");

    let sidecar = storage.path().join("foo/bar.iso.sha256");
    assert_eq!(
        std::fs::read_to_string(sidecar).unwrap(),
        sha256_hex(b"iso contents")
    );
}

#[tokio::test]
async fn test_second_fetch_is_served_from_cache() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();
    upstream.insert("/foo/bar.iso", &b"iso contents"[..]);

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    service.fetch_cached("/foo/bar.iso").await.unwrap();
    let second = service.fetch_cached("/foo/bar.iso").await.unwrap();

    assert_eq!(second.disposition, Disposition::Hit);
    assert_eq!(upstream.hits("/foo/bar.iso"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_at_most_one_fetch_per_key() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();
    upstream.insert("/pool/huge.deb", vec![7u8; 256 * 1024]);

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let mut requests = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        requests.push(tokio::spawn(async move {
            service.fetch_cached("/pool/huge.deb").await
        }));
    }

    for request in requests {
        let cached = request.await.unwrap().unwrap();
        assert_eq!(std::fs::read(&cached.path).unwrap().len(), 256 * 1024);
    }

    assert_eq!(upstream.hits("/pool/huge.deb"), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_request_does_not_abort_fill() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();
    upstream.insert_slow("/pool/slow.deb", vec![3u8; 64 * 1024]);

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let request = tokio::spawn({
        let service = service.clone();
        async move { service.fetch_cached("/pool/slow.deb").await }
    });

    // Let the transfer get going, then drop the requester mid-fill.
    tokio::time::sleep(Duration::from_millis(50)).await;
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    // The fill keeps running detached and releases its permit when done.
    // The follow-up request queues on that permit and finds the object.
    let cached = service.fetch_cached("/pool/slow.deb").await.unwrap();
    assert_eq!(cached.disposition, Disposition::Hit);
    assert_eq!(std::fs::read(&cached.path).unwrap().len(), 64 * 1024);
    assert_eq!(upstream.hits("/pool/slow.deb"), 1);
}

#[tokio::test]
async fn test_missing_upstream_object_leaves_no_artifacts() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let err = service.fetch_cached("/missing.pkg").await.unwrap_err();
    assert_eq!(err, CacheError::NotFound);

    assert!(!storage.path().join("missing.pkg").exists());
    assert_eq!(stats::collect(storage.path()).cached_files, 0);
}

#[tokio::test]
async fn test_upstream_server_error_is_transient() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let err = service
        .fetch_cached("/respond_statuscode/503/thing")
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::DownloadError(_)));
    assert_eq!(stats::collect(storage.path()).cached_files, 0);
}

#[tokio::test]
async fn test_dropped_transfer_leaves_no_artifacts() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();
    upstream.insert_truncated("/big.img", vec![1u8; 64 * 1024]);

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let err = service.fetch_cached("/big.img").await.unwrap_err();
    assert!(matches!(err, CacheError::DownloadError(_)), "got {err:?}");

    assert!(!storage.path().join("big.img").exists());
    // No temp artifact debris either.
    assert_eq!(stats::collect(storage.path()).cached_files, 0);
}

#[tokio::test]
async fn test_out_of_band_corruption_self_heals() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();
    upstream.insert("/foo.bin", &b"good contents"[..]);

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();
    service.fetch_cached("/foo.bin").await.unwrap();

    // Flip the object's bytes while the sidecar stays untouched.
    let object = storage.path().join("foo.bin");
    std::fs::write(&object, b"bad contents!").unwrap();

    let layout = StorageLayout::new(storage.path());
    let key = CacheKey::from_request_path("/foo.bin").unwrap();
    assert_eq!(check(&layout, &key).await, ObjectState::Incomplete);
    assert!(!object.exists());
    assert!(!storage.path().join("foo.bin.sha256").exists());

    // The next request transparently re-fetches.
    let refreshed = service.fetch_cached("/foo.bin").await.unwrap();
    assert_eq!(refreshed.disposition, Disposition::Stored);
    assert_eq!(std::fs::read(&refreshed.path).unwrap(), b"good contents");
    assert_eq!(upstream.hits("/foo.bin"), 2);
}

#[tokio::test]
async fn test_traversal_paths_are_rejected() {
    test::setup();

    let storage = test::tempdir();
    let upstream = test::Upstream::new();

    let service = CacheService::create(test_config(storage.path(), &upstream)).unwrap();

    let err = service.fetch_cached("/../etc/passwd").await.unwrap_err();
    assert_eq!(err, CacheError::NotFound);
    // The upstream is never consulted for an invalid key.
    assert_eq!(upstream.accesses(), 0);
}
