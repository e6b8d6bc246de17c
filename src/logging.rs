//! Tracing infrastructure
//!
//! Installs a global `tracing-subscriber` registry with an `EnvFilter` and one `fmt` layer
//! in the format chosen by [`LoggingConfig`]. `RUST_LOG`, when set, overrides the
//! configured level.
//!
//! # Example
//! ```no_run
//! use beamline::config::{BeamlineConfig, LogFormat};
//! use beamline::logging;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = BeamlineConfig::load()?;
//! config.logging.format = LogFormat::Json;
//! logging::init(&config.logging)?;
//!
//! tracing::info!(records = 3, "Database loaded");
//! # Ok(())
//! # }
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{BeamlineError, BeamlineResult};

/// Initialize tracing, tolerating a subscriber that is already installed.
///
/// Safe to call from tests and from several components.
pub fn init(config: &LoggingConfig) -> BeamlineResult<()> {
    try_init(config).map(drop)
}

/// Initialize tracing. Returns `false` when a global subscriber was already installed,
/// in which case the existing one stays in place.
pub fn try_init(config: &LoggingConfig) -> BeamlineResult<bool> {
    let level = parse_log_level(&config.level)?;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(level)));

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.file_and_line)
            .with_line_number(config.file_and_line)
            .with_thread_names(config.thread_names)
            .with_ansi(config.ansi)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_file(config.file_and_line)
            .with_line_number(config.file_and_line)
            .with_thread_names(config.thread_names)
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_file(config.file_and_line)
            .with_line_number(config.file_and_line)
            .with_thread_names(config.thread_names)
            .with_filter(env_filter)
            .boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(true),
        Err(e) if is_already_initialized(&e.to_string()) => Ok(false),
        Err(e) => Err(BeamlineError::Logging(e.to_string())),
    }
}

fn is_already_initialized(message: &str) -> bool {
    message.contains("has already been set") || message.contains("already initialized")
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> BeamlineResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(BeamlineError::InvalidConfig(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        ))),
    }
}

fn level_to_filter_string(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}
