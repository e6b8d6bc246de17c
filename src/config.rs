//! Configuration system using Figment
//!
//! Configuration is loaded from:
//! 1. `config/beamline.toml` (base configuration)
//! 2. Environment variables prefixed with `BEAMLINE_`, nested keys separated by `__`
//!
//! Every section and every key has a default, so an empty or missing file yields a
//! usable configuration.
//!
//! # Example
//! ```no_run
//! use beamline::config::BeamlineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BeamlineConfig::load()?;
//! config.validate()?;
//! println!("Log level: {}", config.logging.level);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beamline_core::MonitorConfig;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BeamlineError, BeamlineResult};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/beamline.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "BEAMLINE_";

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamlineConfig {
    pub logging: LoggingConfig,
    pub monitor: MonitorSettings,
    pub modules: ModulesConfig,
    pub database: DatabaseConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty-printed format with colors (for development)
    #[default]
    Pretty,
    /// Compact format without colors (for production)
    Compact,
    /// JSON format for log aggregation
    Json,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
    pub thread_names: bool,
    pub file_and_line: bool,
    /// Only honored by the pretty format.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            thread_names: true,
            file_and_line: false,
            ansi: true,
        }
    }
}

/// `[monitor]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// How long a driver waits for its monitor thread to come up.
    pub startup_timeout_ms: u64,
    /// Poll period of acquiring monitor threads.
    pub poll_interval_ms: u64,
    pub thread_name: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            startup_timeout_ms: duration_ms(defaults.startup_timeout),
            poll_interval_ms: duration_ms(defaults.poll_interval),
            thread_name: defaults.thread_name,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl MonitorSettings {
    /// Monitor settings in the core's form.
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            startup_timeout: Duration::from_millis(self.startup_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            thread_name: self.thread_name.clone(),
        }
    }
}

/// `[modules]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Directories scanned for module libraries when `discover` is set.
    pub search_paths: Vec<PathBuf>,
    /// Libraries that must load; any failure aborts startup.
    pub libraries: Vec<PathBuf>,
    pub discover: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            libraries: Vec::new(),
            discover: true,
        }
    }
}

/// `[database]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database files, loaded in order after all modules.
    pub files: Vec<PathBuf>,
    /// Inline record lines, loaded after the files as one batch.
    pub records: Vec<String>,
}

impl BeamlineConfig {
    /// Load configuration from `config/beamline.toml` and environment variables
    ///
    /// Example override: `BEAMLINE_LOGGING__LEVEL=debug`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The provider stack, defaults first. A missing file contributes nothing.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(BeamlineConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Render as TOML, e.g. to write a template file.
    pub fn to_toml(&self) -> BeamlineResult<String> {
        toml::to_string_pretty(self).map_err(|e| BeamlineError::InvalidConfig(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BeamlineResult<()> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            return Err(BeamlineError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            )));
        }

        if self.monitor.startup_timeout_ms == 0 {
            return Err(BeamlineError::InvalidConfig(
                "monitor.startup_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 || self.monitor.poll_interval_ms > 60_000 {
            return Err(BeamlineError::InvalidConfig(format!(
                "Invalid monitor.poll_interval_ms {}. Must be 1-60000",
                self.monitor.poll_interval_ms
            )));
        }
        if self.monitor.thread_name.is_empty() {
            return Err(BeamlineError::InvalidConfig(
                "monitor.thread_name must not be empty".to_string(),
            ));
        }

        let mut libraries = HashSet::new();
        for library in &self.modules.libraries {
            if !libraries.insert(library) {
                return Err(BeamlineError::InvalidConfig(format!(
                    "Duplicate module library: {}",
                    library.display()
                )));
            }
        }

        if let Some(index) = self.database.records.iter().position(|r| r.trim().is_empty()) {
            return Err(BeamlineError::InvalidConfig(format!(
                "database.records[{}] is empty",
                index
            )));
        }

        Ok(())
    }
}
