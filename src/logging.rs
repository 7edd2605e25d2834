//! Global `tracing` subscriber setup.
//!
//! Library code only emits events; binaries and tests that want to see them call
//! [`init_logging`] once.

use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::{XlsReaderError, XlsResult};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Install a stderr subscriber filtered by `RUST_LOG`, falling back to `config.level`.
///
/// Fails with a configuration error when the level is unknown or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> XlsResult<()> {
    let level = config.level.trim().to_ascii_lowercase();
    if !LEVELS.contains(&level.as_str()) {
        return Err(XlsReaderError::config(
            None,
            format!("logging.level must be one of {LEVELS:?} (got '{}')", config.level),
        ));
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xls_reader={level},{level}")));

    let layer = if config.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).with_target(true).boxed()
    };

    Registry::default()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| XlsReaderError::config(None, format!("logging already initialized: {e}")))
}
