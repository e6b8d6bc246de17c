//! Module loading using abi_stable.
//!
//! Libraries are opened through `lib_header_from_path`, which keeps them mapped for the
//! life of the process. Modules are never unloaded.

use std::path::{Path, PathBuf};

use abi_stable::library::lib_header_from_path;
use beamline_core::{ApiVersion, Framework, Module, ModuleManifest, ModuleOrigin};

use crate::adapter::{driver_from_ffi, extension_from_ffi};
use crate::metadata::AbiVersion;
use crate::plugin::{BeamlineModule_Ref, PluginLoadError};

/// Turn a root module into a manifest ready for [`Framework::install_module`].
///
/// The ABI version is checked before anything else is read. The driver table is read
/// up to its first sentinel entry.
pub fn manifest_from_root(
    root: BeamlineModule_Ref,
    origin: ModuleOrigin,
) -> Result<ModuleManifest, PluginLoadError> {
    let version = root.abi_version()();
    let name = root.module_name()().into_string();
    if !version.is_compatible_with(&AbiVersion::CURRENT) {
        return Err(PluginLoadError::IncompatibleAbi {
            module: name,
            plugin_version: version,
            host_version: AbiVersion::CURRENT,
        });
    }

    let mut manifest = ModuleManifest::new(name, origin).with_version(ApiVersion::from(version));
    for entry in root.drivers()() {
        let Some(driver) = entry.driver.into_option() else {
            break;
        };
        let driver = driver_from_ffi(driver).map_err(|source| PluginLoadError::InvalidModule {
            module: manifest.name.clone(),
            source,
        })?;
        manifest.drivers.push(driver);
    }
    for extension in root.extensions()() {
        manifest.extensions.push(extension_from_ffi(extension));
    }
    Ok(manifest)
}

/// Loader for module libraries.
///
/// # Example
///
/// ```rust,ignore
/// let framework = Framework::with_builtin_drivers(MonitorConfig::default())?;
/// let mut loader = ModuleLoader::new();
/// loader.add_search_path("/opt/beamline/modules");
/// let modules = loader.discover(&framework)?;
/// ```
#[derive(Debug, Default)]
pub struct ModuleLoader {
    search_paths: Vec<PathBuf>,
}

impl ModuleLoader {
    /// A loader with no search paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory to search for module libraries
    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref().to_path_buf();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    /// Directories [`ModuleLoader::discover`] scans.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Load one library and install its module into `framework`, all or nothing.
    pub fn load_module<P: AsRef<Path>>(
        &self,
        framework: &Framework,
        path: P,
    ) -> Result<Module, PluginLoadError> {
        let path = path.as_ref();
        let header = lib_header_from_path(path).map_err(|e| PluginLoadError::LoadFailed {
            path: path.to_path_buf(),
            message: format!("Failed to load library header: {}", e),
        })?;
        let root = header
            .init_root_module::<BeamlineModule_Ref>()
            .map_err(|e| PluginLoadError::LoadFailed {
                path: path.to_path_buf(),
                message: format!("Failed to init root module: {}", e),
            })?;

        let manifest = manifest_from_root(root, ModuleOrigin::Library(path.to_path_buf()))?;
        let module = framework.install_module(manifest)?;
        tracing::info!(module = %module.name, path = %path.display(), "Loaded module library");
        Ok(module)
    }

    /// Load every module library found in the search paths.
    ///
    /// Missing directories are skipped. A library that fails to load is logged and
    /// skipped; the others are still installed.
    pub fn discover(&self, framework: &Framework) -> Result<Vec<Module>, PluginLoadError> {
        let mut loaded = Vec::new();

        for search_path in &self.search_paths {
            if !search_path.exists() {
                tracing::debug!(path = %search_path.display(), "Module directory does not exist");
                continue;
            }

            let entries = std::fs::read_dir(search_path).map_err(|source| PluginLoadError::Io {
                path: search_path.clone(),
                source,
            })?;
            let mut paths: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| Self::is_module_library(path))
                .collect();
            // Directory order is unspecified; install in a stable order.
            paths.sort();

            for path in paths {
                match self.load_module(framework, &path) {
                    Ok(module) => loaded.push(module),
                    Err(e) => {
                        tracing::warn!("Failed to load module {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(loaded)
    }

    /// Check if a path looks like a shared library for this platform
    pub fn is_module_library(path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        #[cfg(target_os = "macos")]
        {
            extension == "dylib"
        }
        #[cfg(target_os = "linux")]
        {
            extension == "so"
        }
        #[cfg(target_os = "windows")]
        {
            extension == "dll"
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library_name(stem: &str) -> String {
        let ext = if cfg!(target_os = "macos") {
            "dylib"
        } else if cfg!(target_os = "windows") {
            "dll"
        } else {
            "so"
        };
        format!("{}.{}", stem, ext)
    }

    #[test]
    fn test_search_paths_deduplicated() {
        let mut loader = ModuleLoader::new();
        loader.add_search_path("/opt/beamline/modules");
        loader.add_search_path("/opt/beamline/modules");
        assert_eq!(loader.search_paths().len(), 1);
    }

    #[test]
    fn test_only_files_with_library_extension_qualify() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "not a library").unwrap();
        assert!(!ModuleLoader::is_module_library(&text));
        assert!(!ModuleLoader::is_module_library(dir.path()));
    }

    #[test]
    fn test_missing_library_fails_without_side_effects() {
        let framework = Framework::default();
        let err = ModuleLoader::new()
            .load_module(&framework, "/nonexistent/libnothing.so")
            .unwrap_err();
        assert!(matches!(err, PluginLoadError::LoadFailed { .. }));
        assert!(framework.modules().is_empty());
    }

    #[test]
    fn test_discover_skips_bad_libraries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(library_name("libbroken")), b"garbage").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"text").unwrap();

        let framework = Framework::default();
        let mut loader = ModuleLoader::new();
        loader.add_search_path(dir.path());
        loader.add_search_path(dir.path().join("missing"));

        let modules = loader.discover(&framework).unwrap();
        assert!(modules.is_empty());
        assert!(framework.modules().is_empty());
    }
}
