//! Application error type.
//!
//! `BeamlineError` wraps the core's [`CoreError`], module loading failures from
//! [`PluginLoadError`] and the configuration, logging and file errors raised while
//! bootstrapping a framework.

use std::path::PathBuf;

use beamline_core::CoreError;
use beamline_plugin_api::PluginLoadError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type BeamlineResult<T> = std::result::Result<T, BeamlineError>;

#[derive(Error, Debug)]
/// Errors raised while configuring and bootstrapping a framework.
pub enum BeamlineError {
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Plugin(#[from] PluginLoadError),
}
