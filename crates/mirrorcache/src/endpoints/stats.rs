use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use mirrorcache_service::service::CacheService;
use mirrorcache_service::stats::collect;

use crate::endpoints::error::ResponseError;

/// A summary of the cache contents and its configuration.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    cached_files: u64,
    cache_size_mb: u64,
    cache_limit_mb: u64,
    storage_dir: String,
    upstream: String,
}

/// Reports the number of cached files and the space they occupy.
///
/// The storage directory is walked on every request, so this is intended for
/// occasional inspection rather than high-frequency scraping.
pub async fn stats(
    State(service): State<CacheService>,
) -> Result<Json<StatsResponse>, ResponseError> {
    let config = service.config();

    let storage_dir = config.storage_dir.clone();
    let storage_stats = tokio::task::spawn_blocking(move || collect(&storage_dir))
        .await
        .map_err(|_| std::io::Error::other("stats collection task failed"))?;

    Ok(Json(StatsResponse {
        cached_files: storage_stats.cached_files,
        cache_size_mb: storage_stats.total_bytes / 1024 / 1024,
        cache_limit_mb: config.cache_size_mb,
        storage_dir: config.storage_dir.display().to_string(),
        upstream: config.upstream.clone(),
    }))
}
