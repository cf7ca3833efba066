//! Process-wide `tracing` subscriber setup.
//!
//! `RUST_LOG` wins over [`LogConfig::level`] when set. Timestamps are RFC 3339 UTC.

use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::ConfigError;

/// Installs the global subscriber: compact lines, or JSON lines when `cfg.json`.
///
/// Fails if the level directive is invalid or a global subscriber is already set.
pub fn init(cfg: &LogConfig) -> Result<(), ConfigError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level).map_err(|e| ConfigError::Logging(e.to_string()))?,
    };

    let fmt_layer = if cfg.json {
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::NONE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_span_events(FmtSpan::NONE)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .compact()
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}
