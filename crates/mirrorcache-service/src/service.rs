//! The cache coordinator: decides between serving a cached object and
//! performing a serialized fill from the upstream mirror.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::caching::{
    CacheContents, CacheError, CacheKey, KeyLockManager, ObjectState, StorageLayout, check, commit,
};
use crate::config::Config;
use crate::download::HttpDownloader;

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Served from local storage without contacting the upstream.
    Hit,
    /// Freshly fetched from the upstream and stored.
    Stored,
}

/// A complete local object ready to be served.
#[derive(Debug, Clone)]
pub struct CachedObject {
    /// Path of the published object on disk.
    pub path: PathBuf,
    /// Whether this request filled the cache or was served from it.
    pub disposition: Disposition,
}

/// Entry point for all cache lookups and fills.
///
/// Cheap to clone; all state is shared behind an [`Arc`].
#[derive(Debug, Clone)]
pub struct CacheService {
    inner: Arc<ServiceInner>,
}

#[derive(Debug)]
struct ServiceInner {
    config: Config,
    layout: StorageLayout,
    locks: KeyLockManager,
    downloader: HttpDownloader,
}

impl CacheService {
    /// Creates the service, its storage root, and the upstream client.
    pub fn create(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_dir)
            .context("failed to create storage directory")?;

        let layout = StorageLayout::new(&config.storage_dir);
        let downloader =
            HttpDownloader::new(&config).context("failed to create upstream client")?;

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                layout,
                locks: KeyLockManager::new(),
                downloader,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Looks up `request_path`, filling the cache from the upstream mirror
    /// if needed.
    ///
    /// For any one key at most one fill runs at a time; all concurrent
    /// requests for that key settle on the outcome of that single fill.
    pub async fn fetch_cached(&self, request_path: &str) -> CacheContents<CachedObject> {
        let key = CacheKey::from_request_path(request_path).ok_or(CacheError::NotFound)?;
        let inner = &self.inner;

        // Fast path without the key lock.
        if check(&inner.layout, &key).await.is_complete() {
            tracing::info!(key = %key, "cache hit");
            return Ok(inner.cached(&key, Disposition::Hit));
        }

        tracing::info!(key = %key, "cache miss, filling from upstream");

        // The wait for the permit runs on the request task: a client that
        // disconnects while queued simply stops waiting. The fill itself is
        // spawned as a detached task below, so it keeps running for the
        // other waiters even if the triggering request goes away.
        let permit = inner.locks.acquire(&key).await;

        let fill = {
            let inner = Arc::clone(inner);
            let key = key.clone();
            tokio::spawn(async move {
                let _permit = permit;
                inner.fill(&key).await
            })
        };

        let disposition = fill
            .await
            .unwrap_or_else(|_| Err(CacheError::CommitFailed("cache fill task failed".into())))?;

        Ok(inner.cached(&key, disposition))
    }
}

impl ServiceInner {
    fn cached(&self, key: &CacheKey, disposition: Disposition) -> CachedObject {
        CachedObject {
            path: self.layout.object_path(key),
            disposition,
        }
    }

    /// The locked double-check, fetch, commit, verify sequence.
    ///
    /// Runs with the fill permit for `key` held; the permit is released by
    /// the surrounding task whatever the outcome.
    async fn fill(&self, key: &CacheKey) -> CacheContents<Disposition> {
        // Another holder may have finished this fill while we were queued.
        if check(&self.layout, key).await.is_complete() {
            tracing::info!(key = %key, "cache hit after waiting for fill permit");
            return Ok(Disposition::Hit);
        }

        let remote = self.downloader.fetch(key).await?;
        let digest = commit(&self.layout, key, remote).await?;

        match check(&self.layout, key).await {
            ObjectState::Complete => {
                tracing::info!(key = %key, digest = %digest, "object stored");
                Ok(Disposition::Stored)
            }
            ObjectState::Incomplete => {
                tracing::error!(key = %key, "stored object failed re-validation");
                Err(CacheError::VerifyFailed)
            }
        }
    }
}
