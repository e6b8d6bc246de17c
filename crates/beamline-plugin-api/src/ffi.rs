//! FFI-safe driver and extension interfaces using abi_stable's sabi_trait.
//!
//! Records never cross the library boundary. A driver verb receives an [`FfiRecord`]
//! snapshot (the record name and every field rendered as text) and answers with an
//! [`FfiReply`] carrying a scalar result, an optional array of readings and the field
//! updates the host should store back into the record.

#![allow(non_local_definitions)] // abi_stable's sabi_trait generates these

use std::fmt;

use abi_stable::sabi_trait;
use abi_stable::std_types::{RBox, ROption, RResult, RString, RVec};
use abi_stable::StableAbi;
use beamline_core::{CoreError, ErrorKind};

/// One schema row in FFI-stable form.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, StableAbi)]
pub struct FfiFieldDescriptor {
    pub name: RString,
    /// `FieldType` tag.
    pub type_tag: u8,
    pub rank: u32,
    pub dimensions: RVec<u32>,
    pub offset: u64,
    pub element_size: u64,
    /// `FieldFlags` bits.
    pub flags: u32,
    /// `StructKind` tag.
    pub struct_kind: u8,
    pub length_field: ROption<RString>,
}

/// FFI-safe error category
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub enum FfiErrorKind {
    Unsupported = 0,
    InvalidValue = 1,
    FieldNotFound = 2,
    Hardware = 3,
    Other = 4,
}

/// Error reported by plugin code.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, StableAbi)]
pub struct FfiError {
    pub kind: FfiErrorKind,
    pub message: RString,
}

impl FfiError {
    /// An error of `kind`.
    pub fn new(kind: FfiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: RString::from(message.into()),
        }
    }

    /// The verb is not implemented.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(FfiErrorKind::Unsupported, operation)
    }

    /// An argument or field value was rejected.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(FfiErrorKind::InvalidValue, message)
    }
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<CoreError> for FfiError {
    fn from(err: CoreError) -> Self {
        let kind = match err.kind() {
            ErrorKind::UnsupportedOperation => FfiErrorKind::Unsupported,
            ErrorKind::InvalidValue | ErrorKind::IndexOutOfRange => FfiErrorKind::InvalidValue,
            ErrorKind::FieldNotFound => FfiErrorKind::FieldNotFound,
            ErrorKind::Driver => FfiErrorKind::Hardware,
            _ => FfiErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// FFI-safe result type for plugin operations
pub type FfiResult<T> = RResult<T, FfiError>;

/// Operations a plugin driver may implement. Lifecycle hooks first, then class verbs.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StableAbi)]
pub enum FfiVerb {
    Open = 0,
    Close = 1,
    MoveAbsolute = 2,
    GetPosition = 3,
    SoftAbort = 4,
    Home = 5,
    ReadRaw = 6,
    WriteRaw = 7,
    Start = 8,
    Stop = 9,
    Clear = 10,
    Status = 11,
    Read = 12,
}

impl FfiVerb {
    /// Name used in `UnsupportedOperation` errors.
    pub fn name(self) -> &'static str {
        match self {
            FfiVerb::Open => "open",
            FfiVerb::Close => "close",
            FfiVerb::MoveAbsolute => "move_absolute",
            FfiVerb::GetPosition => "get_position",
            FfiVerb::SoftAbort => "soft_abort",
            FfiVerb::Home => "home",
            FfiVerb::ReadRaw => "read_raw",
            FfiVerb::WriteRaw => "write_raw",
            FfiVerb::Start => "start",
            FfiVerb::Stop => "stop",
            FfiVerb::Clear => "clear",
            FfiVerb::Status => "status",
            FfiVerb::Read => "read",
        }
    }
}

/// A field name and its value rendered as text.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, StableAbi)]
pub struct FfiFieldValue {
    pub name: RString,
    pub text: RString,
}

/// Snapshot of a record handed to a plugin verb.
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq, StableAbi)]
pub struct FfiRecord {
    pub name: RString,
    pub fields: RVec<FfiFieldValue>,
}

impl FfiRecord {
    /// Text of `field`, if the snapshot has it.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.as_str() == field)
            .map(|f| f.text.as_str())
    }

    /// Parse `field` as a number.
    pub fn get_f64(&self, field: &str) -> Result<f64, FfiError> {
        let text = self
            .get(field)
            .ok_or_else(|| FfiError::new(FfiErrorKind::FieldNotFound, field))?;
        text.trim()
            .parse()
            .map_err(|_| FfiError::invalid(format!("field '{}' is not numeric: '{}'", field, text)))
    }
}

/// Answer of a plugin verb.
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, StableAbi)]
pub struct FfiReply {
    /// Scalar result: position, raw reading or status code, depending on the verb.
    pub value: f64,
    /// Readings returned by `Read`.
    pub values: RVec<f64>,
    /// Fields to store into the record, ignoring the read-only flag.
    pub updates: RVec<FfiFieldValue>,
}

impl FfiReply {
    /// A reply with no value and no updates.
    pub fn done() -> Self {
        Self::default()
    }

    /// A reply carrying one value.
    pub fn value(value: f64) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// A reply carrying several values.
    pub fn values(values: Vec<f64>) -> Self {
        Self {
            values: RVec::from(values),
            ..Self::default()
        }
    }

    /// Also store `text` into `field`.
    pub fn with_update(mut self, field: &str, text: impl fmt::Display) -> Self {
        self.updates.push(FfiFieldValue {
            name: RString::from(field),
            text: RString::from(text.to_string()),
        });
        self
    }
}

/// The FFI-safe driver trait.
///
/// `fields` returns the driver's type schema rows; the class schema is fixed by
/// `class_tag`. Only verbs reported by `supports` are ever invoked.
#[sabi_trait]
pub trait DriverFfi: Send + Sync + 'static {
    fn type_name(&self) -> RString;

    /// `RecordClass` tag.
    fn class_tag(&self) -> u8;

    fn fields(&self) -> RVec<FfiFieldDescriptor>;

    fn supports(&self, verb: FfiVerb) -> bool;

    /// Run `verb` against a record snapshot. `argument` carries the destination, raw
    /// output value or homing direction.
    fn invoke(&self, verb: FfiVerb, record: FfiRecord, argument: f64) -> FfiResult<FfiReply>;
}

/// Owned, boxed FFI driver (like `Box<dyn DriverFfi>`)
pub type DriverFfiBox = DriverFfi_TO<RBox<()>>;

/// The FFI-safe extension trait. Plugins answer unsupported calls with
/// [`FfiError::unsupported`].
#[sabi_trait]
pub trait ExtensionFfi: Send + 'static {
    fn name(&self) -> RString;

    fn initialize(&mut self) -> FfiResult<()>;

    fn finalize(&mut self) -> FfiResult<()>;

    fn call(&mut self, args: RVec<RString>) -> FfiResult<RString>;

    fn call_string(&mut self, text: RString) -> FfiResult<RString>;
}

/// Owned, boxed FFI extension
pub type ExtensionFfiBox = ExtensionFfi_TO<RBox<()>>;

/// One row of a module's driver table. The table ends at the first empty entry.
#[repr(C)]
#[derive(StableAbi)]
pub struct FfiDriverEntry {
    pub driver: ROption<DriverFfiBox>,
}

impl FfiDriverEntry {
    /// An entry holding `driver`.
    pub fn new(driver: DriverFfiBox) -> Self {
        Self {
            driver: ROption::RSome(driver),
        }
    }

    /// The terminating entry.
    pub fn sentinel() -> Self {
        Self {
            driver: ROption::RNone,
        }
    }

    /// True for the terminating entry.
    pub fn is_sentinel(&self) -> bool {
        self.driver.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_snapshot_lookup() {
        let record = FfiRecord {
            name: RString::from("ai"),
            fields: RVec::from(vec![FfiFieldValue {
                name: RString::from("scale"),
                text: RString::from("2.5"),
            }]),
        };
        assert_eq!(record.get("scale"), Some("2.5"));
        assert_eq!(record.get_f64("scale").unwrap(), 2.5);
        assert_eq!(
            record.get_f64("offset").unwrap_err().kind,
            FfiErrorKind::FieldNotFound
        );
    }

    #[test]
    fn test_core_errors_keep_their_category() {
        let err = FfiError::from(CoreError::FieldReadOnly("value".into()));
        assert_eq!(err.kind, FfiErrorKind::Other);
        let err = FfiError::from(CoreError::FieldNotFound("gain".into()));
        assert_eq!(err.kind, FfiErrorKind::FieldNotFound);
        assert!(err.message.as_str().contains("gain"));
    }

    #[test]
    fn test_reply_builder() {
        let reply = FfiReply::value(3.0).with_update("count", 4);
        assert_eq!(reply.value, 3.0);
        assert_eq!(reply.updates[0].text.as_str(), "4");
    }
}
