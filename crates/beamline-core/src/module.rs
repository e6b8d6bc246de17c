//! Module descriptors and version gating.
//!
//! A module contributes drivers and extensions to a live [`crate::Framework`]. The dynamic
//! library side (symbol lookup, ABI layout) lives in the plugin API crate; it hands the
//! framework a [`ModuleManifest`] which is installed all-or-nothing by
//! [`crate::Framework::install_module`].

use std::fmt;
use std::path::PathBuf;

use crate::driver::Driver;
use crate::extension::Extension;

/// Framework ABI version a module is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    /// Version of the running framework.
    pub const CURRENT: ApiVersion = ApiVersion::new(1, 0, 0);

    /// A version triple.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// A module is loadable when its major version matches the framework's and it needs
    /// no newer minor version than the framework provides.
    pub fn is_compatible_with(&self, framework: &ApiVersion) -> bool {
        self.major == framework.major && self.minor <= framework.minor
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Where a module came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// A shared library loaded from disk. The library stays mapped for the life of the
    /// process.
    Library(PathBuf),
    /// Compiled into the host process.
    Static(String),
}

impl fmt::Display for ModuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleOrigin::Library(path) => write!(f, "{}", path.display()),
            ModuleOrigin::Static(name) => write!(f, "static:{}", name),
        }
    }
}

/// Everything a module contributes, ready to be installed.
pub struct ModuleManifest {
    pub name: String,
    pub version: ApiVersion,
    pub drivers: Vec<Driver>,
    pub extensions: Vec<Box<dyn Extension>>,
    pub origin: ModuleOrigin,
}

impl ModuleManifest {
    /// An empty manifest at the current API version.
    pub fn new(name: impl Into<String>, origin: ModuleOrigin) -> Self {
        Self {
            name: name.into(),
            version: ApiVersion::CURRENT,
            drivers: Vec::new(),
            extensions: Vec::new(),
            origin,
        }
    }

    /// Declare the API version the module was built against.
    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    /// Add a driver.
    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Add an extension.
    pub fn with_extension(mut self, extension: Box<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }
}

impl fmt::Debug for ModuleManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleManifest")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("drivers", &self.drivers.len())
            .field("extensions", &self.extensions.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// A module installed into a framework. Modules are never unloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub version: ApiVersion,
    pub driver_names: Vec<String>,
    pub extension_names: Vec<String>,
    pub origin: ModuleOrigin,
    /// Id of the framework the module was installed into.
    pub framework_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let framework = ApiVersion::new(1, 2, 0);
        assert!(ApiVersion::new(1, 0, 7).is_compatible_with(&framework));
        assert!(ApiVersion::new(1, 2, 3).is_compatible_with(&framework));
        assert!(!ApiVersion::new(1, 3, 0).is_compatible_with(&framework));
        assert!(!ApiVersion::new(2, 0, 0).is_compatible_with(&framework));
    }

    #[test]
    fn test_display() {
        assert_eq!(ApiVersion::CURRENT.to_string(), "1.0.0");
        assert_eq!(
            ModuleOrigin::Static("builtin".into()).to_string(),
            "static:builtin"
        );
    }
}
