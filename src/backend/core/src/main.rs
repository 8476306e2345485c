//! Conveyor Server - Main entry point
//!
//! Hosts the worker trigger endpoint, the job management API, and the
//! health/metrics surfaces for the registered handlers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use conveyor_core::{
    api::{self, AppState, HandlerRegistry},
    cache::{CacheBackend, MemoryCache, RedisCache},
    config::{BackendKind, Config},
    jobs::{Dispatcher, HttpSelfTrigger, WebhookDeliveryProcessor},
    store::{KvStore, MemoryKvStore, RedisKvStore},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    // Initialize observability
    let metrics_handle = telemetry::init("conveyor-server", &config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Conveyor Server"
    );
    config.worker.validate();

    // Storage backends
    let (kv, cache): (Arc<dyn KvStore>, Arc<dyn CacheBackend>) = match config.worker.backend {
        BackendKind::Memory => {
            tracing::info!("Using in-memory backends; jobs will not survive a restart");
            (Arc::new(MemoryKvStore::new()), Arc::new(MemoryCache::new()))
        }
        BackendKind::Redis => {
            let client = redis::Client::open(config.redis.url.as_str())
                .map_err(|e| anyhow::anyhow!("Failed to create Redis client: {}", e))?;
            tracing::info!(url = %config.redis.url, "Using Redis backends");
            (
                Arc::new(RedisKvStore::new(client.clone(), "conveyor")),
                Arc::new(RedisCache::new(client)),
            )
        }
    };

    // Self-trigger posting back to this server
    let trigger = Arc::new(HttpSelfTrigger::new(
        config.server.public_url.clone(),
        config.worker.dispatch_timeout,
    )?);

    let trigger_secret = config
        .worker
        .trigger_secret
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Built-in webhook delivery handler
    let webhooks = Dispatcher::builder("webhooks")
        .kv_store(kv)
        .cache(cache)
        .processor(Arc::new(WebhookDeliveryProcessor::new(Duration::from_secs(
            10,
        ))?))
        .trigger(trigger)
        .settings(config.worker.clone())
        .trigger_secret(trigger_secret)
        .build()?;
    tracing::info!(
        handler = "webhooks",
        trigger_token = %webhooks.trigger_token(),
        "Handler registered"
    );

    let mut registry = HandlerRegistry::new();
    registry.register(webhooks);

    let state = AppState {
        registry: Arc::new(registry),
        metrics: metrics_handle,
    };

    // Build router
    let app = api::build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
