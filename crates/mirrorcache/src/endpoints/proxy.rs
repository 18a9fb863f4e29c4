use axum::body::Body;
use axum::extract::State;
use axum::http::{Uri, header};
use axum::response::Response;
use tokio_util::io::ReaderStream;

use mirrorcache_service::service::CacheService;

use crate::endpoints::error::ResponseError;

/// Serves a file from the cache, filling it from the upstream mirror on a miss.
pub async fn proxy_request(
    State(service): State<CacheService>,
    uri: Uri,
) -> Result<Response, ResponseError> {
    let cached = service.fetch_cached(uri.path()).await?;

    let file = tokio::fs::File::open(&cached.path).await?;
    let len = file.metadata().await?.len();

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::new(file)))?;

    Ok(response)
}
