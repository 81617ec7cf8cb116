//! Tracing subscriber initialization.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::domain::models::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("failed to install json subscriber")?,
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .context("failed to install subscriber")?,
    }

    Ok(())
}
