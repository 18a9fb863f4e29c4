use std::io;
use std::time::Duration;

use thiserror::Error;

/// An error that happens while filling the cache from the upstream mirror.
///
/// Every component converts its own failures into one of these variants at
/// the boundary that produced them, after cleaning up its partial side
/// effects. The coordinator and the HTTP layer never see raw I/O or
/// transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The upstream mirror does not have the requested file.
    #[error("not found")]
    NotFound,
    /// The download did not finish within the configured timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The file could not be fetched from the upstream mirror due to
    /// connection loss, DNS failure, or a non-success response status.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The transfer ended with a different byte count than the upstream
    /// announced.
    #[error("incomplete download: got {actual} bytes, expected {expected}")]
    LengthMismatch {
        /// The length announced by the upstream.
        expected: u64,
        /// The number of bytes actually received.
        actual: u64,
    },
    /// Writing, syncing or publishing the downloaded file failed locally.
    #[error("commit failed: {0}")]
    CommitFailed(String),
    /// The freshly committed object did not pass re-validation.
    ///
    /// This points at a committer bug or hardware-level corruption and is
    /// worth alerting on, unlike the routine variants above.
    #[error("stored object failed verification")]
    VerifyFailed,
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        Self::CommitFailed(err.to_string())
    }
}

impl CacheError {
    /// Flattens a transport error chain into a
    /// [`DownloadError`](Self::DownloadError).
    ///
    /// The innermost source usually carries the actionable message
    /// (connection refused, dns failure, ...), the outer layers only wrap it.
    pub(crate) fn download_error(mut error: &dyn std::error::Error) -> Self {
        while let Some(source) = error.source() {
            error = source;
        }

        Self::DownloadError(error.to_string())
    }
}

/// Result of a cache operation, containing either `Ok(T)` or the reason the
/// object could not be fetched or stored.
pub type CacheContents<T = ()> = Result<T, CacheError>;
