//! Engine configuration model.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration, merged by the loader from defaults, a
/// YAML file, and `ONSTAQ_`-prefixed environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Maximum rule executions admitted in parallel.
    pub max_concurrent_executions: usize,
    /// Default poll interval for trigger watchers, milliseconds.
    pub poll_interval_ms: u64,
    /// Lower bound on the poll interval, milliseconds.
    pub min_poll_interval_ms: u64,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 3201,
            max_concurrent_executions: 10,
            poll_interval_ms: 60_000,
            min_poll_interval_ms: 10_000,
            api: ApiConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Effective poll interval: `max(default, min)`.
    pub fn effective_poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.max(self.min_poll_interval_ms)
    }
}

/// Upstream Onstaq API connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub service_email: String,
    pub service_password: String,
    /// Per-call timeout, seconds.
    pub timeout_secs: u64,
    pub rate_limit_rps: f64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            service_email: String::new(),
            service_password: String::new(),
            timeout_secs: 30,
            rate_limit_rps: 10.0,
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:onstaq-automation.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error.
    pub level: String,
    /// One of: json, pretty.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
