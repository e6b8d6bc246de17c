//! Error types for the record framework.
//!
//! Every fallible operation in this crate returns [`CoreResult`]. [`CoreError`] carries a
//! human-readable message and can be classified with [`CoreError::kind`], which is what
//! callers match on when they need to react to a specific failure (for example treating
//! [`ErrorKind::UnsupportedOperation`] as "this driver does not implement the verb").
//!
//! ## Error Hierarchy
//!
//! - **Lookup failures**: `UnknownType`, `NotFound`, `FieldNotFound`
//! - **Namespace collisions**: `DuplicateName` (records, drivers, extensions, modules, fields)
//! - **Field access**: `FieldReadOnly`, `IndexOutOfRange`, `InvalidValue`
//! - **Dispatch**: `UnsupportedOperation` for optional verbs a driver leaves out,
//!   `CorruptState` when a record is wired to the wrong table or schema
//! - **Resources**: `OutOfMemory`, `SynchronizationFailure`
//! - **Modules**: `VersionMismatch`, `ModuleLoad`
//! - **Drivers**: `Driver` wraps a [`DriverError`] reported by a concrete driver hook

use std::fmt;
use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a failure reported by a concrete driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Configuration,
    Communication,
    Shutdown,
    Hardware,
    Timeout,
    InvalidParameter,
    Unknown,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Structured error raised from inside a driver hook.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    /// A driver error of `kind` raised by `driver_type`.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

// =============================================================================
// Core Errors
// =============================================================================

/// Which name space a duplicate or missing name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Record,
    Driver,
    Extension,
    Module,
    Field,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Namespace::Record => "record",
            Namespace::Driver => "driver",
            Namespace::Extension => "extension",
            Namespace::Module => "module",
            Namespace::Field => "field",
        };
        write!(f, "{}", label)
    }
}

/// Classification of a [`CoreError`], used for matching without inspecting payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullArgument,
    UnknownType,
    DuplicateName,
    NotFound,
    CorruptState,
    UnsupportedOperation,
    OutOfMemory,
    VersionMismatch,
    SynchronizationFailure,
    FieldNotFound,
    FieldReadOnly,
    IndexOutOfRange,
    InvalidValue,
    Config,
    ModuleLoad,
    Driver,
    ShutdownFailed,
}

/// Primary error type for the record framework.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// A required argument was empty or missing.
    #[error("Missing required argument: {0}")]
    NullArgument(&'static str),

    /// The driver registry has no entry for the requested type name.
    #[error("Unknown record type '{0}'")]
    UnknownType(String),

    /// A name collided with an existing entry of the same namespace.
    #[error("Duplicate {namespace} name '{name}'")]
    DuplicateName { namespace: Namespace, name: String },

    /// A named record, extension or module does not exist.
    #[error("No {namespace} named '{name}'")]
    NotFound { namespace: Namespace, name: String },

    /// A payload block, schema or dispatch table is absent or of the wrong kind.
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// The driver leaves this optional operation out of its dispatch table.
    #[error("Operation '{operation}' is not supported by {target}")]
    UnsupportedOperation {
        target: String,
        operation: &'static str,
    },

    /// An allocation for a payload block or array failed.
    #[error("Out of memory while {0}")]
    OutOfMemory(String),

    /// A module was built against an incompatible framework ABI.
    #[error("Module '{module}' declares version {found}, framework requires {expected}")]
    VersionMismatch {
        module: String,
        found: String,
        expected: String,
    },

    /// A thread, mutex or condition variable primitive failed.
    #[error("Synchronization failure: {0}")]
    SynchronizationFailure(String),

    /// The field is not declared by either schema of the record.
    #[error("Field '{0}' not found")]
    FieldNotFound(String),

    /// The field is flagged read-only for generic writes.
    #[error("Field '{0}' is read-only")]
    FieldReadOnly(String),

    /// An array index fell outside the valid element range.
    #[error("Index {index} out of range for field '{field}' (valid length {length})")]
    IndexOutOfRange {
        field: String,
        index: usize,
        length: usize,
    },

    /// A value could not be converted to the field's type or violates a constraint.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Configuration text could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A module could not be loaded or installed.
    #[error("Failed to load module '{module}': {message}")]
    ModuleLoad { module: String, message: String },

    /// Structured driver error with category.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// One or more records or extensions failed to shut down.
    #[error("Shutdown failed with {} error(s)", .0.len())]
    ShutdownFailed(Vec<CoreError>),
}

impl CoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NullArgument(_) => ErrorKind::NullArgument,
            CoreError::UnknownType(_) => ErrorKind::UnknownType,
            CoreError::DuplicateName { .. } => ErrorKind::DuplicateName,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::CorruptState(_) => ErrorKind::CorruptState,
            CoreError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            CoreError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            CoreError::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            CoreError::SynchronizationFailure(_) => ErrorKind::SynchronizationFailure,
            CoreError::FieldNotFound(_) => ErrorKind::FieldNotFound,
            CoreError::FieldReadOnly(_) => ErrorKind::FieldReadOnly,
            CoreError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            CoreError::InvalidValue { .. } => ErrorKind::InvalidValue,
            CoreError::Config(_) => ErrorKind::Config,
            CoreError::ModuleLoad { .. } => ErrorKind::ModuleLoad,
            CoreError::Driver(_) => ErrorKind::Driver,
            CoreError::ShutdownFailed(_) => ErrorKind::ShutdownFailed,
        }
    }

    pub(crate) fn duplicate(namespace: Namespace, name: impl Into<String>) -> Self {
        CoreError::DuplicateName {
            namespace,
            name: name.into(),
        }
    }

    pub(crate) fn not_found(namespace: Namespace, name: impl Into<String>) -> Self {
        CoreError::NotFound {
            namespace,
            name: name.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
