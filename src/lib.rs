//! # beamline
//!
//! Host-side entry point for the beamline record framework.
//!
//! The record machinery lives in [`beamline_core`]; module libraries are loaded through
//! [`beamline_plugin_api`]. This crate adds what a running installation needs around them:
//!
//! - [`config`]: figment-based configuration from `config/beamline.toml` and `BEAMLINE_*`
//!   environment variables
//! - [`logging`]: tracing-subscriber setup
//! - [`bootstrap`](mod@bootstrap): building a [`Framework`](beamline_core::Framework) with
//!   modules and databases loaded
//!
//! # Example
//!
//! ```no_run
//! use beamline::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let framework = beamline::bootstrap_from_file("config/beamline.toml")?;
//! let theta = framework.find_record("theta")?;
//! motor::move_absolute(&mut theta.lock(), 1.0)?;
//! framework.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;

pub use beamline_core;
pub use beamline_plugin_api;

pub use bootstrap::{bootstrap, bootstrap_from_file};
pub use config::BeamlineConfig;
pub use error::{BeamlineError, BeamlineResult};

/// Core prelude plus the host entry points.
pub mod prelude {
    pub use crate::bootstrap::{bootstrap, bootstrap_from_file};
    pub use crate::config::{BeamlineConfig, LogFormat};
    pub use crate::error::{BeamlineError, BeamlineResult};
    pub use beamline_core::prelude::*;
    pub use beamline_plugin_api::ModuleLoader;
}
