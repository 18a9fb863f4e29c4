//! Fetching objects from the upstream mirror.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};

use crate::caching::{CacheContents, CacheError, CacheKey};
use crate::config::Config;

/// A source of downloaded bytes consumed by the committer.
///
/// Implemented by [`RemoteObject`] for real transfers; tests substitute
/// in-memory sources to drive the committer without a network.
pub trait ByteSource: Send {
    /// Number of bytes the source announced, if it did.
    fn expected_len(&self) -> Option<u64>;

    /// The next chunk of the transfer, or `None` once it is finished.
    ///
    /// Transfer failures are already classified into [`CacheError`] here.
    fn next_chunk(&mut self) -> impl Future<Output = CacheContents<Option<Bytes>>> + Send;
}

/// Downloader for the configured upstream mirror.
///
/// Classifies every outcome into the cache error taxonomy: an upstream 404
/// is terminal, everything else is reported to the caller as transient.
/// This layer never retries.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    upstream: String,
    max_download_timeout: Duration,
}

impl HttpDownloader {
    /// Creates a downloader with the configured connect and download
    /// timeouts.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.max_download_timeout)
            .build()?;

        Ok(Self {
            client,
            upstream: config.upstream.trim_end_matches('/').to_string(),
            max_download_timeout: config.max_download_timeout,
        })
    }

    /// Requests `key` from the upstream mirror and classifies the response.
    pub async fn fetch(&self, key: &CacheKey) -> CacheContents<RemoteObject> {
        let url = format!("{}/{}", self.upstream, key);
        tracing::debug!(url = %url, "fetching from upstream");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| classify(err, self.max_download_timeout))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CacheError::NotFound),
            status if !status.is_success() => Err(CacheError::DownloadError(format!(
                "upstream returned status {status}"
            ))),
            _ => Ok(RemoteObject {
                expected_len: response.content_length(),
                response,
                timeout: self.max_download_timeout,
            }),
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout(timeout)
    } else {
        CacheError::download_error(&err)
    }
}

/// A successfully opened upstream transfer.
#[derive(Debug)]
pub struct RemoteObject {
    response: reqwest::Response,
    expected_len: Option<u64>,
    timeout: Duration,
}

impl ByteSource for RemoteObject {
    fn expected_len(&self) -> Option<u64> {
        self.expected_len
    }

    async fn next_chunk(&mut self) -> CacheContents<Option<Bytes>> {
        self.response
            .chunk()
            .await
            .map_err(|err| classify(err, self.timeout))
    }
}
