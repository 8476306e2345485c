//! Configuration management.

use serde::Deserialize;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (job documents + lock cache)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Worker configuration
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL the worker uses to trigger itself.
    ///
    /// The bind host is usually not routable (0.0.0.0), so the self-trigger
    /// posts to this loopback address instead.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

/// Which backend pair to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process backends; documents do not survive a restart
    Memory,
    /// Redis-backed store and lock cache
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Storage backend for job documents and the process lock
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Wall-clock budget for a single worker invocation
    #[serde(with = "humantime_serde", default = "default_time_limit")]
    pub time_limit: Duration,

    /// TTL of the process lock entry.
    ///
    /// Must exceed `time_limit`, or a worker's own lock can expire mid-run
    /// and let an overlapping worker start.
    #[serde(with = "humantime_serde", default = "default_lock_ttl")]
    pub lock_ttl: Duration,

    /// Period of the health-check re-trigger interval
    #[serde(with = "humantime_serde", default = "default_healthcheck_interval")]
    pub healthcheck_interval: Duration,

    /// Timeout for the outbound self-trigger request
    #[serde(with = "humantime_serde", default = "default_dispatch_timeout")]
    pub dispatch_timeout: Duration,

    /// Key inside the job document that holds the item sequence
    #[serde(default = "default_payload_key")]
    pub payload_key: String,

    /// Value recorded as `created_by` when the creator supplies none
    #[serde(default = "default_created_by")]
    pub created_by: String,

    /// Secret for deriving per-handler trigger tokens.
    ///
    /// When unset, a random secret is generated at startup; externally
    /// issued triggers then need the token printed in the startup log.
    #[serde(default)]
    pub trigger_secret: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            time_limit: default_time_limit(),
            lock_ttl: default_lock_ttl(),
            healthcheck_interval: default_healthcheck_interval(),
            dispatch_timeout: default_dispatch_timeout(),
            payload_key: default_payload_key(),
            created_by: default_created_by(),
            trigger_secret: None,
        }
    }
}

impl WorkerSettings {
    /// Validate the settings, warning on hazardous combinations.
    pub fn validate(&self) {
        if self.lock_ttl <= self.time_limit {
            tracing::warn!(
                lock_ttl_secs = self.lock_ttl.as_secs(),
                time_limit_secs = self.time_limit.as_secs(),
                "Lock TTL does not exceed the time budget; a worker's lock can expire mid-run"
            );
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_public_url() -> String { format!("http://127.0.0.1:{}", default_port()) }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_backend() -> BackendKind { BackendKind::Memory }
fn default_time_limit() -> Duration { Duration::from_secs(20) }
fn default_lock_ttl() -> Duration { Duration::from_secs(60) }
fn default_healthcheck_interval() -> Duration { Duration::from_secs(300) }
fn default_dispatch_timeout() -> Duration { Duration::from_secs(1) }
fn default_payload_key() -> String { "data".to_string() }
fn default_created_by() -> String { "system".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CONVEYOR").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CONVEYOR").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_settings_defaults() {
        let settings = WorkerSettings::default();
        assert_eq!(settings.time_limit, Duration::from_secs(20));
        assert_eq!(settings.lock_ttl, Duration::from_secs(60));
        assert_eq!(settings.healthcheck_interval, Duration::from_secs(300));
        assert_eq!(settings.payload_key, "data");
        assert!(settings.lock_ttl > settings.time_limit);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.worker.backend, BackendKind::Memory);
        assert_eq!(config.observability.log_level, "info");
    }
}
