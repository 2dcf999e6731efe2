//! Offline Proxy - offline-first caching in front of a web origin
//!
//! Sits between browsers and the real origin, serving page navigations and
//! static assets from a versioned cache when the origin is slow or down.

mod config;
mod error;
mod server;
mod types;
mod upstream;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use crate::upstream::UpstreamFetcher;
use offline_cache::{
    CacheStorage, FileStorage, LogBuffer, MemoryStorage, RegisterOutcome, Registration,
    ServiceWorker,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let logs = LogBuffer::new();

    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("offline_proxy=info".parse()?)
        .add_directive("offline_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .with(logs.layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(logs.layer())
            .init();
    };

    info!("Starting Offline Proxy...");

    let config = ProxyConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Upstream: {}", config.upstream_url);
    info!("Public origin: {}", config.public_origin);
    info!("Cache version: {}", config.version);
    info!("Network timeout: {:?}", config.network_timeout);

    let storage: Arc<dyn CacheStorage> = match &config.cache_dir {
        Some(dir) => {
            info!("Cache dir: {:?}", dir);
            let storage = FileStorage::new(dir.clone());
            storage.init().await?;
            Arc::new(storage)
        }
        None => {
            info!("Cache dir: none (in-memory)");
            Arc::new(MemoryStorage::new())
        }
    };

    let upstream = Arc::new(UpstreamFetcher::new(config.upstream_url.clone())?);

    let worker = ServiceWorker::new(config.worker_config(), storage.clone(), upstream.clone())?;
    let registration = Arc::new(Registration::new());

    // An install failure leaves the proxy uncontrolled; requests still pass through
    match registration.register(Arc::new(worker)).await {
        Ok(RegisterOutcome::Activated(report)) => info!(
            version = %config.version,
            deleted = report.deleted.len(),
            "Worker activated"
        ),
        Ok(RegisterOutcome::Waiting) => info!(version = %config.version, "Worker waiting"),
        Err(e) => error!(version = %config.version, error = %e, "Worker install failed"),
    }

    let state: SharedState = Arc::new(ServerState::new(
        registration,
        storage,
        upstream,
        logs,
        config.public_origin.clone(),
    ));

    // Start HTTP server (blocking)
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
