//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::EngineConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_executions: {0}. Must be between 1 and 100")]
    InvalidMaxConcurrent(usize),

    #[error("Invalid poll intervals: poll_interval_ms ({0}) and min_poll_interval_ms ({1}) must be positive")]
    InvalidPollIntervals(u64, u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Upstream API URL cannot be empty")]
    EmptyApiUrl,

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. onstaq-automation.yaml (project config)
    /// 3. `ONSTAQ_*` environment variables (nested keys split on `__`)
    /// 4. The documented flat environment names (`PORT`, `DATABASE_URL`, …)
    pub fn load() -> Result<EngineConfig> {
        let mut config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file("onstaq-automation.yaml"))
            .merge(Env::prefixed("ONSTAQ_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::apply_flat_env_overrides(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// The deployment surface documents a handful of flat variable names;
    /// they win over everything else.
    fn apply_flat_env_overrides(config: &mut EngineConfig) {
        if let Some(port) = flat_env("PORT") {
            config.port = port;
        }
        if let Ok(url) = std::env::var("ONSTAQ_API_URL") {
            config.api.url = url;
        }
        if let Ok(email) = std::env::var("ONSTAQ_SERVICE_EMAIL") {
            config.api.service_email = email;
        }
        if let Ok(password) = std::env::var("ONSTAQ_SERVICE_PASSWORD") {
            config.api.service_password = password;
        }
        if let Some(interval) = flat_env("POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval;
        }
        if let Some(min_interval) = flat_env("MIN_POLL_INTERVAL_MS") {
            config.min_poll_interval_ms = min_interval;
        }
        if let Some(max) = flat_env("MAX_CONCURRENT_EXECUTIONS") {
            config.max_concurrent_executions = max;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
        if config.max_concurrent_executions == 0 || config.max_concurrent_executions > 100 {
            return Err(ConfigError::InvalidMaxConcurrent(
                config.max_concurrent_executions,
            ));
        }

        if config.poll_interval_ms == 0 || config.min_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollIntervals(
                config.poll_interval_ms,
                config.min_poll_interval_ms,
            ));
        }

        if config.database.url.is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }

        if config.api.url.is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }

        if config.api.rate_limit_rps <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(config.api.rate_limit_rps));
        }

        if config.api.initial_backoff_ms >= config.api.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.api.initial_backoff_ms,
                config.api.max_backoff_ms,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

fn flat_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_executions, 10);
        assert_eq!(config.poll_interval_ms, 60_000);
        assert_eq!(config.min_poll_interval_ms, 10_000);
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn test_effective_poll_interval_takes_the_max() {
        let mut config = EngineConfig::default();
        config.poll_interval_ms = 5_000;
        config.min_poll_interval_ms = 10_000;
        assert_eq!(config.effective_poll_interval_ms(), 10_000);

        config.poll_interval_ms = 120_000;
        assert_eq!(config.effective_poll_interval_ms(), 120_000);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
port: 8200
max_concurrent_executions: 4
api:
  url: http://upstream:3000
  rate_limit_rps: 5.0
logging:
  level: debug
  format: json
";
        let config: EngineConfig = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.port, 8200);
        assert_eq!(config.max_concurrent_executions, 4);
        assert_eq!(config.api.url, "http://upstream:3000");
        assert!((config.api.rate_limit_rps - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "debug");

        ConfigLoader::validate(&config).expect("parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = EngineConfig::default();
        config.max_concurrent_executions = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConcurrent(0))
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = EngineConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_url() {
        let mut config = EngineConfig::default();
        config.database.url = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabaseUrl)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = EngineConfig::default();
        config.api.initial_backoff_ms = 60_000;
        config.api.max_backoff_ms = 30_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(60_000, 30_000))
        ));
    }
}
