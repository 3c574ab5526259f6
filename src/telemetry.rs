//! Tracing setup shared by front ends.
//!
//! The subscriber is installed once with a reloadable filter so the level
//! configured in `ReaderConfig` can be applied after config load without
//! reinstalling anything.

use crate::config::LogLevel;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

pub type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Install the global subscriber. `RUST_LOG` wins until a config level is
/// applied via [`set_log_level`].
pub fn init_telemetry() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

/// Apply the configured verbosity to the running subscriber.
pub fn set_log_level(handle: &ReloadHandle, level: LogLevel) {
    let level = level.as_filter_str();
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
