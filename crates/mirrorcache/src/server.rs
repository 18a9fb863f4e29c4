//! Server bootstrap.

use std::net::SocketAddr;

use anyhow::{Context, Result};

use mirrorcache_service::config::Config;
use mirrorcache_service::service::CacheService;

use crate::endpoints;

/// Starts the tokio runtime and serves the HTTP API until shutdown.
pub fn run(config: Config) -> Result<()> {
    let megs = 1024 * 1024;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("mirrorcache-web")
        .enable_all()
        .thread_stack_size(8 * megs)
        .build()?;

    let socket = config.bind.parse::<SocketAddr>()?;
    let service = CacheService::create(config).context("failed to create cache service")?;

    tracing::info!(
        storage_dir = %service.config().storage_dir.display(),
        upstream = %service.config().upstream,
        "Starting HTTP server on {}", socket
    );

    runtime.block_on(
        axum_server::bind(socket).serve(endpoints::create_app(service).into_make_service()),
    )?;
    tracing::info!("System shutdown complete");

    Ok(())
}
