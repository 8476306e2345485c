//! Telemetry: structured logging and Prometheus metrics.

pub mod metrics;

pub use self::metrics::register_metrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Initialize the observability stack.
///
/// Sets up the tracing subscriber and installs the Prometheus metrics
/// recorder. Call once at startup; the returned handle renders the
/// `/metrics` exposition text.
pub fn init(service_name: &str, config: &ObservabilityConfig) -> anyhow::Result<PrometheusHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    self::metrics::register_metrics();

    tracing::info!(service = service_name, "Telemetry initialized");
    Ok(handle)
}

/// Install only the metrics recorder, without a tracing subscriber.
///
/// Useful in tests where a global subscriber is already set.
pub fn init_metrics_only() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    self::metrics::register_metrics();
    Ok(handle)
}
