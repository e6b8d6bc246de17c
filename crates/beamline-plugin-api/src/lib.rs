//! FFI-stable module ABI for beamline plugins.
//!
//! A plugin is a shared library exporting one [`BeamlineModule`] root module through
//! `abi_stable`. The root module carries the ABI version, the module name, a driver table
//! terminated by an empty sentinel entry, and a list of extensions. The host checks the
//! version before touching anything else, wraps every FFI object in the core's traits and
//! installs the result into a [`beamline_core::Framework`] all-or-nothing.
//!
//! # Architecture
//!
//! ```text
//! ModuleLoader
//! ├── lib_header_from_path (abi_stable, library leaked)
//! ├── BeamlineModule_Ref   ← exported by the plugin
//! ├── adapter              ← DriverFfi / ExtensionFfi → Driver / Extension
//! └── Framework::install_module
//! ```
//!
//! # Creating a Plugin
//!
//! ```rust,ignore
//! use beamline_plugin_api::prelude::*;
//!
//! #[export_root_module]
//! pub fn get_root_module() -> BeamlineModule_Ref {
//!     BeamlineModule { abi_version, module_name, drivers, extensions }.leak_into_prefix()
//! }
//! ```

#![allow(unsafe_code)] // abi_stable derives and library loading are unsafe under the hood

pub mod adapter;
pub mod ffi;
pub mod loader;
pub mod metadata;
pub mod plugin;

pub use adapter::{driver_from_ffi, extension_from_ffi, schema_from_rows, schema_rows};
pub use ffi::*;
pub use loader::{manifest_from_root, ModuleLoader};
pub use metadata::AbiVersion;
pub use plugin::{BeamlineModule, BeamlineModule_Ref, PluginLoadError};

/// Prelude for plugin authors
pub mod prelude {
    pub use crate::adapter::schema_rows;
    pub use crate::ffi::{
        DriverFfi, DriverFfiBox, DriverFfi_TO, ExtensionFfi, ExtensionFfiBox, ExtensionFfi_TO,
        FfiDriverEntry, FfiError, FfiErrorKind, FfiFieldDescriptor, FfiFieldValue, FfiRecord,
        FfiReply, FfiResult, FfiVerb,
    };
    pub use crate::metadata::AbiVersion;
    pub use crate::plugin::{BeamlineModule, BeamlineModule_Ref};
    pub use abi_stable::export_root_module;
    pub use abi_stable::prefix_type::PrefixTypeTrait;
    pub use abi_stable::sabi_extern_fn;
    pub use abi_stable::sabi_trait::TD_Opaque;
    pub use abi_stable::std_types::{RBox, ROption, RResult, RStr, RString, RVec};
    pub use abi_stable::StableAbi;
}

/// Re-export abi_stable for plugin convenience
pub use abi_stable;
