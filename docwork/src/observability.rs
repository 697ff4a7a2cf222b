//! Tracing bootstrap

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a JSON formatting subscriber filtered by `service.log_level`
///
/// An unparsable level falls back to `info`. Calling this twice fails
/// because a global subscriber is already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|e| crate::error::Error::Internal(format!("failed to install subscriber: {}", e)))?;

    tracing::info!(
        environment = %config.service.environment,
        "Tracing initialized for service: {}",
        config.service.name
    );

    Ok(())
}
