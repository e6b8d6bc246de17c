//! ABI version with StableAbi derives.

use abi_stable::StableAbi;
use beamline_core::ApiVersion;

/// Version information for ABI compatibility checking
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub struct AbiVersion {
    /// Major version - breaking changes
    pub major: u32,
    /// Minor version - backwards-compatible additions
    pub minor: u32,
    /// Patch version - bug fixes
    pub patch: u32,
}

impl AbiVersion {
    /// Version of the framework this crate was built against.
    pub const CURRENT: Self = Self::from_api(ApiVersion::CURRENT);

    /// A version triple.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    const fn from_api(version: ApiVersion) -> Self {
        Self::new(version.major, version.minor, version.patch)
    }

    /// Check whether a module built against `self` can run in a framework of `host`.
    pub fn is_compatible_with(&self, host: &Self) -> bool {
        ApiVersion::from(*self).is_compatible_with(&ApiVersion::from(*host))
    }
}

impl From<AbiVersion> for ApiVersion {
    fn from(version: AbiVersion) -> Self {
        ApiVersion::new(version.major, version.minor, version.patch)
    }
}

impl From<ApiVersion> for AbiVersion {
    fn from(version: ApiVersion) -> Self {
        Self::from_api(version)
    }
}

impl std::fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
