//! Tracing subscriber bootstrap
//!
//! The library itself only emits `tracing` events. Embedding applications
//! that do not install their own subscriber can call [`init`] with the
//! logging section of [`Config`](crate::config::Config).

use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Builds the filter: `RUST_LOG` when set, the configured level otherwise.
pub fn env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => configured_filter(config),
    }
}

/// Builds the filter from the configured level alone, ignoring `RUST_LOG`.
pub fn configured_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(config.level.trim())
        .with_context(|| format!("invalid log level '{}'", config.level))
}

/// Installs a global fmt subscriber configured from `config`.
///
/// Fails if a global subscriber is already set; the existing one is left
/// in place.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
