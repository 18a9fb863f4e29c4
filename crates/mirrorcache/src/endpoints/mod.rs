//! Web endpoints for the cache server.

use axum::Router;
use axum::routing::get;

use mirrorcache_service::service::CacheService;

mod error;
mod health;
mod proxy;
mod stats;

/// Builds the router serving all endpoints.
///
/// Every path that is not one of the `/api` endpoints is treated as a request
/// for a mirrored file and handled by the proxy.
pub fn create_app(service: CacheService) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/stats", get(stats::stats))
        .fallback(get(proxy::proxy_request))
        .with_state(service)
}
