//! Building a running [`Framework`] from configuration.

use std::path::Path;

use beamline_core::Framework;
use beamline_plugin_api::ModuleLoader;
use tracing::{info, instrument};

use crate::config::BeamlineConfig;
use crate::error::{BeamlineError, BeamlineResult};
use crate::logging;

/// Build a framework as described by `config`.
///
/// Steps, in order: validate, register the built-in drivers, load the explicit module
/// libraries, discover modules in the search paths, load the database files, load the
/// inline record lines. Records are opened as they are loaded. Any failure drops the
/// partially built framework, which shuts it down.
#[instrument(skip_all)]
pub fn bootstrap(config: &BeamlineConfig) -> BeamlineResult<Framework> {
    config.validate()?;
    let framework = Framework::with_builtin_drivers(config.monitor.to_monitor_config())?;

    let mut loader = ModuleLoader::new();
    for path in &config.modules.search_paths {
        loader.add_search_path(path);
    }
    for library in &config.modules.libraries {
        loader.load_module(&framework, library)?;
    }
    if config.modules.discover {
        loader.discover(&framework)?;
    }

    for file in &config.database.files {
        let text = std::fs::read_to_string(file).map_err(|source| BeamlineError::Io {
            path: file.clone(),
            source,
        })?;
        let names = framework.load_database(&text)?;
        info!(file = %file.display(), records = names.len(), "Database file loaded");
    }
    if !config.database.records.is_empty() {
        framework.load_database(&config.database.records.join("\n"))?;
    }

    info!(
        framework = framework.id(),
        drivers = framework.driver_names().len(),
        modules = framework.modules().len(),
        records = framework.record_count(),
        "Framework bootstrapped"
    );
    Ok(framework)
}

/// Load configuration from `path` and the environment, initialize logging, and bootstrap.
pub fn bootstrap_from_file<P: AsRef<Path>>(path: P) -> BeamlineResult<Framework> {
    let config = BeamlineConfig::load_from(path)?;
    config.validate()?;
    logging::init(&config.logging)?;
    bootstrap(&config)
}
