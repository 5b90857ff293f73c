mod address;
mod api;
mod cache;
mod config;
mod error;
mod minecraft;
mod service;

use crate::address::DnsSrvLookup;
use crate::api::AppState;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::service::ServiceContext;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mcstatus=info,tower_http=info")),
        )
        .init();

    let config = Config::from_args();

    let cache = Arc::new(TtlCache::new(config.cache_ttl()));
    let service = Arc::new(ServiceContext::new(
        config.probe_settings(),
        cache.clone(),
        Arc::new(DnsSrvLookup::new(config.srv_timeout())),
    ));

    if let Err(e) = service.reload_from_file(&config.servers_file).await {
        warn!("{}; starting with an empty roster", e);
    }

    let sweeper = cache::spawn_sweeper(cache, config.sweep_interval());

    if config.admin_token().is_none() {
        warn!("ADMIN_TOKEN is not set; admin endpoints are disabled");
    }

    let app = api::router(AppState {
        service,
        admin_token: config.admin_token().map(Arc::from),
        servers_file: Arc::new(config.servers_file.clone()),
    })
    .layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .into_inner(),
    );

    let addr = SocketAddr::new(config.listen_ip, config.port);
    info!("Starting mcstatus API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
