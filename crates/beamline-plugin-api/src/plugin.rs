//! Plugin root module and load errors.
//!
//! Plugins export a root module via `get_root_module()` that provides the ABI version,
//! the module name, the driver table and the extensions.

#![allow(non_camel_case_types)] // abi_stable generates `*_Ref` types
#![allow(clippy::expl_impl_clone_on_copy)] // StableAbi macro generates Clone impl for Copy type

use std::path::PathBuf;

use abi_stable::library::RootModule;
use abi_stable::package_version_strings;
use abi_stable::sabi_types::VersionStrings;
use abi_stable::std_types::{RString, RVec};
use abi_stable::{declare_root_module_statics, StableAbi};
use beamline_core::CoreError;

use crate::ffi::{ExtensionFfiBox, FfiDriverEntry};
use crate::metadata::AbiVersion;

/// The root module that plugins export.
///
/// # Example
///
/// ```rust,ignore
/// use beamline_plugin_api::prelude::*;
///
/// #[export_root_module]
/// pub fn get_root_module() -> BeamlineModule_Ref {
///     BeamlineModule {
///         abi_version,
///         module_name,
///         drivers,
///         extensions,
///     }
///     .leak_into_prefix()
/// }
///
/// #[sabi_extern_fn]
/// fn abi_version() -> AbiVersion {
///     AbiVersion::CURRENT
/// }
/// ```
#[repr(C)]
#[derive(StableAbi)]
#[sabi(kind(Prefix(prefix_ref = BeamlineModule_Ref)))]
#[sabi(missing_field(panic))]
pub struct BeamlineModule {
    /// ABI version the module was compiled against. Checked before any other entry.
    pub abi_version: extern "C" fn() -> AbiVersion,

    #[sabi(last_prefix_field)]
    pub module_name: extern "C" fn() -> RString,

    /// Driver table, terminated by [`FfiDriverEntry::sentinel`].
    pub drivers: extern "C" fn() -> RVec<FfiDriverEntry>,

    pub extensions: extern "C" fn() -> RVec<ExtensionFfiBox>,
}

impl RootModule for BeamlineModule_Ref {
    declare_root_module_statics! {BeamlineModule_Ref}

    const BASE_NAME: &'static str = "beamline_module";
    const NAME: &'static str = "beamline_module";
    const VERSION_STRINGS: VersionStrings = package_version_strings!();
}

impl BeamlineModule_Ref {
    /// Check if this module's ABI is compatible with the host
    pub fn is_compatible(&self) -> bool {
        self.abi_version()().is_compatible_with(&AbiVersion::CURRENT)
    }
}

/// Error type for plugin loading
#[derive(Debug, thiserror::Error)]
pub enum PluginLoadError {
    /// The library file could not be opened or has no usable root module.
    #[error("Failed to load plugin library {}: {message}", path.display())]
    LoadFailed { path: PathBuf, message: String },

    /// The module's ABI version is incompatible.
    #[error("Module '{module}' ABI version {plugin_version} is incompatible with host version {host_version}")]
    IncompatibleAbi {
        module: String,
        plugin_version: AbiVersion,
        host_version: AbiVersion,
    },

    /// An entry of the root module could not be adapted.
    #[error("Module '{module}' is malformed: {source}")]
    InvalidModule {
        module: String,
        #[source]
        source: CoreError,
    },

    /// A search directory could not be read.
    #[error("Failed to read plugin directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Installation into the framework failed and was rolled back.
    #[error(transparent)]
    Install(#[from] CoreError),
}

impl From<PluginLoadError> for CoreError {
    fn from(err: PluginLoadError) -> Self {
        match err {
            PluginLoadError::IncompatibleAbi {
                module,
                plugin_version,
                host_version,
            } => CoreError::VersionMismatch {
                module,
                found: plugin_version.to_string(),
                expected: host_version.to_string(),
            },
            PluginLoadError::Install(err) => err,
            PluginLoadError::InvalidModule { module, source } => CoreError::ModuleLoad {
                module,
                message: source.to_string(),
            },
            PluginLoadError::LoadFailed { ref path, .. } | PluginLoadError::Io { ref path, .. } => {
                CoreError::ModuleLoad {
                    module: path.display().to_string(),
                    message: err.to_string(),
                }
            }
        }
    }
}
