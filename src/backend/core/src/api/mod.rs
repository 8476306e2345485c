//! API layer for Conveyor Core.
//!
//! Two surfaces share the router:
//!
//! - the **worker trigger** (`POST /worker/:handler`) — the inbound side of
//!   the self-dispatch loop; token-gated, always terminates the request
//!   without a meaningful body
//! - the **management API** under `/api/v1/jobs` — create, list, inspect,
//!   fail, and delete job documents
//!
//! Plus the unversioned `/health` and `/metrics` endpoints.

mod handlers;
pub mod v1;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::jobs::Dispatcher;

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// The dispatchers this server hosts, keyed by handler identifier.
#[derive(Default)]
pub struct HandlerRegistry {
    dispatchers: HashMap<String, Arc<Dispatcher>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatcher under its handler identifier.
    pub fn register(&mut self, dispatcher: Arc<Dispatcher>) {
        self.dispatchers
            .insert(dispatcher.handler().to_string(), dispatcher);
    }

    /// Look up a dispatcher.
    pub fn get(&self, handler: &str) -> Option<&Arc<Dispatcher>> {
        self.dispatchers.get(handler)
    }

    /// The registered handler identifiers.
    pub fn handlers(&self) -> Vec<&str> {
        self.dispatchers.keys().map(String::as_str).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// App State & Router
// ═══════════════════════════════════════════════════════════════════════════════

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HandlerRegistry>,
    pub metrics: PrometheusHandle,
}

/// Build the API router.
///
/// # Endpoints
///
/// - `GET /health` - Liveness probe
/// - `GET /metrics` - Prometheus exposition
/// - `POST /worker/:handler` - Inbound worker trigger (token-gated)
/// - `/api/v1/jobs/...` - Job management (see [`v1::routes`])
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/worker/:handler", post(handlers::trigger_worker))
        .nest("/api/v1", v1::routes::v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// API response wrapper.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
