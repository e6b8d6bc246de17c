//! Typed values moved in and out of payload blocks.

use std::fmt;

use serde::Serialize;

use super::schema::{FieldType, RECORD_NAME_LENGTH};
use crate::error::{CoreError, CoreResult};

/// A decoded field value.
///
/// Arrays are represented as [`FieldValue::Array`], nested once per dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    RecordRef(String),
    Bytes(Vec<u8>),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// The element type this value carries, if it is not an array.
    pub fn field_type(&self) -> Option<FieldType> {
        Some(match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Int8(_) => FieldType::Int8,
            FieldValue::UInt8(_) => FieldType::UInt8,
            FieldValue::Int16(_) => FieldType::Int16,
            FieldValue::UInt16(_) => FieldType::UInt16,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::UInt32(_) => FieldType::UInt32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::String(_) => FieldType::String,
            FieldValue::RecordRef(_) => FieldType::RecordRef,
            FieldValue::Bytes(_) => FieldType::Opaque,
            FieldValue::Array(_) => return None,
        })
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            FieldValue::Bool(v) => Some(i128::from(*v)),
            FieldValue::Int8(v) => Some(i128::from(*v)),
            FieldValue::UInt8(v) => Some(i128::from(*v)),
            FieldValue::Int16(v) => Some(i128::from(*v)),
            FieldValue::UInt16(v) => Some(i128::from(*v)),
            FieldValue::Int32(v) => Some(i128::from(*v)),
            FieldValue::UInt32(v) => Some(i128::from(*v)),
            FieldValue::Int64(v) => Some(i128::from(*v)),
            FieldValue::UInt64(v) => Some(i128::from(*v)),
            FieldValue::Float(v) => integral_f64(f64::from(*v)),
            FieldValue::Double(v) => integral_f64(*v),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(f64::from(*v)),
            FieldValue::Double(v) => Some(*v),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    /// Integer value as `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    /// Non-negative integer value as `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|v| u64::try_from(v).ok())
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            other => match other.as_i128() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
        }
    }

    /// Text of a string or record reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::RecordRef(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of an array value.
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Flatten nested arrays into a single row-major list of elements.
    pub fn flatten(self) -> Vec<FieldValue> {
        match self {
            FieldValue::Array(items) => items.into_iter().flat_map(FieldValue::flatten).collect(),
            scalar => vec![scalar],
        }
    }

    /// Convert this value to `target`, rejecting lossy or out-of-range conversions.
    pub fn coerce(&self, field: &str, target: FieldType) -> CoreResult<FieldValue> {
        let mismatch = || {
            CoreError::invalid(
                field,
                format!("cannot store {} in a {} field", self.describe(), target),
            )
        };
        let out_of_range = || {
            CoreError::invalid(field, format!("{} is out of range for {}", self, target))
        };

        macro_rules! integer {
            ($variant:ident, $ty:ty) => {{
                let wide = self.as_i128().ok_or_else(mismatch)?;
                FieldValue::$variant(<$ty>::try_from(wide).map_err(|_| out_of_range())?)
            }};
        }

        Ok(match target {
            FieldType::Bool => FieldValue::Bool(match self {
                FieldValue::Bool(v) => *v,
                other => match other.as_i128() {
                    Some(0) => false,
                    Some(1) => true,
                    Some(_) => return Err(out_of_range()),
                    None => return Err(mismatch()),
                },
            }),
            FieldType::Int8 => integer!(Int8, i8),
            FieldType::UInt8 => integer!(UInt8, u8),
            FieldType::Int16 => integer!(Int16, i16),
            FieldType::UInt16 => integer!(UInt16, u16),
            FieldType::Int32 => integer!(Int32, i32),
            FieldType::UInt32 => integer!(UInt32, u32),
            FieldType::Int64 => integer!(Int64, i64),
            FieldType::UInt64 => integer!(UInt64, u64),
            FieldType::Float => {
                let wide = self.as_f64().ok_or_else(mismatch)?;
                let narrow = wide as f32;
                if wide.is_finite() && !narrow.is_finite() {
                    return Err(out_of_range());
                }
                FieldValue::Float(narrow)
            }
            FieldType::Double => FieldValue::Double(self.as_f64().ok_or_else(mismatch)?),
            FieldType::String => FieldValue::String(self.as_str().ok_or_else(mismatch)?.to_string()),
            FieldType::RecordRef => {
                let name = self.as_str().ok_or_else(mismatch)?;
                if name.len() > RECORD_NAME_LENGTH {
                    return Err(CoreError::invalid(
                        field,
                        format!("record name longer than {RECORD_NAME_LENGTH} bytes"),
                    ));
                }
                FieldValue::RecordRef(name.to_string())
            }
            FieldType::Opaque => match self {
                FieldValue::Bytes(bytes) => FieldValue::Bytes(bytes.clone()),
                _ => return Err(mismatch()),
            },
        })
    }

    fn describe(&self) -> String {
        match self.field_type() {
            Some(ty) => format!("a {ty} value"),
            None => "an array".to_string(),
        }
    }
}

fn integral_f64(value: f64) -> Option<i128> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1.0e38 {
        Some(value as i128)
    } else {
        None
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", u8::from(*v)),
            FieldValue::Int8(v) => write!(f, "{v}"),
            FieldValue::UInt8(v) => write!(f, "{v}"),
            FieldValue::Int16(v) => write!(f, "{v}"),
            FieldValue::UInt16(v) => write!(f, "{v}"),
            FieldValue::Int32(v) => write!(f, "{v}"),
            FieldValue::UInt32(v) => write!(f, "{v}"),
            FieldValue::Int64(v) => write!(f, "{v}"),
            FieldValue::UInt64(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
            FieldValue::String(s) | FieldValue::RecordRef(s) => f.write_str(s),
            FieldValue::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            FieldValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                FieldValue::$variant(value)
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::Array(values.into_iter().map(Into::into).collect())
    }
}
