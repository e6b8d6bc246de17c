//! Field descriptor schemas.
//!
//! A [`FieldSchema`] is the table of [`FieldDescriptor`] rows describing one payload block:
//! the name, type, shape and byte offset of every field. Schemas are tagged with the
//! [`StructKind`] they address so a class-level row is never interpreted against a
//! type-level block.
//!
//! Offsets are computed exactly once, by [`SchemaBuilder::build`] (or validated once by
//! [`FieldSchema::from_descriptors`] for rows that arrive precomputed across the plugin ABI).

use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;

use crate::error::{CoreError, CoreResult, Namespace};

/// Dimension value marking a variable-length ("varargs") array.
pub const VARARGS_DIMENSION: u32 = u32::MAX;

/// Maximum length in bytes of a record name, and the storage size of a `RecordRef` field.
pub const RECORD_NAME_LENGTH: usize = 40;

/// Primitive type of a field element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Bool = 1,
    Int8 = 2,
    UInt8 = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    /// NUL padded text with a fixed byte capacity.
    String = 12,
    /// Name of another record, resolved during `finish_init`.
    RecordRef = 13,
    /// Raw bytes of a fixed size.
    Opaque = 14,
}

impl FieldType {
    /// Stable numeric tag used in the plugin ABI.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`FieldType::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => FieldType::Bool,
            2 => FieldType::Int8,
            3 => FieldType::UInt8,
            4 => FieldType::Int16,
            5 => FieldType::UInt16,
            6 => FieldType::Int32,
            7 => FieldType::UInt32,
            8 => FieldType::Int64,
            9 => FieldType::UInt64,
            10 => FieldType::Float,
            11 => FieldType::Double,
            12 => FieldType::String,
            13 => FieldType::RecordRef,
            14 => FieldType::Opaque,
            _ => return None,
        })
    }

    /// Element size for types whose size does not depend on the declaration.
    pub fn natural_size(self) -> Option<usize> {
        match self {
            FieldType::Bool | FieldType::Int8 | FieldType::UInt8 => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float => Some(4),
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => Some(8),
            FieldType::RecordRef => Some(RECORD_NAME_LENGTH),
            FieldType::String | FieldType::Opaque => None,
        }
    }

    /// Alignment of one element in bytes.
    pub fn alignment(self) -> usize {
        match self {
            FieldType::String | FieldType::RecordRef | FieldType::Opaque => 1,
            other => other.natural_size().unwrap_or(1),
        }
    }

    /// True for the signed and unsigned integer types.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::UInt8
                | FieldType::Int16
                | FieldType::UInt16
                | FieldType::Int32
                | FieldType::UInt32
                | FieldType::Int64
                | FieldType::UInt64
        )
    }

    /// Types that may be used as array elements.
    pub fn is_numeric_or_bool(self) -> bool {
        self.is_integer() || matches!(self, FieldType::Bool | FieldType::Float | FieldType::Double)
    }

    /// Lower-case type name.
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int8 => "int8",
            FieldType::UInt8 => "uint8",
            FieldType::Int16 => "int16",
            FieldType::UInt16 => "uint16",
            FieldType::Int32 => "int32",
            FieldType::UInt32 => "uint32",
            FieldType::Int64 => "int64",
            FieldType::UInt64 => "uint64",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::RecordRef => "record",
            FieldType::Opaque => "opaque",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Visibility and access flags of a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u32 {
        /// Parsed from and printed in the record description line.
        const IN_DESCRIPTION = 0x1;
        /// Included in one-line summaries.
        const IN_SUMMARY = 0x2;
        /// Generic writes are rejected with `FieldReadOnly`.
        const READ_ONLY = 0x4;
        /// Left out of dumps and JSON marshalling.
        const NO_ACCESS = 0x8;
    }
}

/// Which payload block a schema addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StructKind {
    /// Layout shared by every driver of a record class.
    Class = 0,
    /// Driver-private layout.
    Type = 1,
}

impl StructKind {
    /// Inverse of the `u8` representation.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StructKind::Class),
            1 => Some(StructKind::Type),
            _ => None,
        }
    }
}

impl fmt::Display for StructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructKind::Class => f.write_str("class"),
            StructKind::Type => f.write_str("type"),
        }
    }
}

/// One row of a field schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Empty for scalars. A varargs array has [`VARARGS_DIMENSION`] as its only dimension.
    pub dimensions: Vec<u32>,
    /// Byte offset inside the owning block. Varargs storage lives outside the block.
    pub offset: usize,
    /// Bytes per element; the capacity for `String` fields.
    pub element_size: usize,
    pub flags: FieldFlags,
    /// Integer scalar holding the current element count of a varargs array.
    pub length_field: Option<String>,
    pub struct_kind: StructKind,
}

impl FieldDescriptor {
    /// Number of dimensions; 0 for scalars.
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// True when the field has no dimensions.
    pub fn is_scalar(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// True when the first dimension follows a length field.
    pub fn is_varargs(&self) -> bool {
        self.dimensions.first() == Some(&VARARGS_DIMENSION)
    }

    /// True when generic writes are refused.
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(FieldFlags::READ_ONLY)
    }

    /// Number of elements of a scalar or fixed array; `None` for varargs.
    pub fn fixed_count(&self) -> Option<usize> {
        if self.is_varargs() {
            return None;
        }
        Some(self.dimensions.iter().map(|d| *d as usize).product())
    }

    /// Bytes this field occupies inside its block.
    pub fn block_len(&self) -> usize {
        self.fixed_count().unwrap_or(0) * self.element_size
    }

    fn corrupt(&self, message: &str) -> CoreError {
        CoreError::CorruptState(format!("field '{}': {}", self.name, message))
    }

    fn validate_shape(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::NullArgument("field name"));
        }
        if self.element_size == 0 {
            return Err(self.corrupt("element size is zero"));
        }
        if let Some(natural) = self.field_type.natural_size() {
            if natural != self.element_size {
                return Err(self.corrupt("element size does not match its type"));
            }
        }
        if self.rank() > 0 && !self.field_type.is_numeric_or_bool() {
            return Err(self.corrupt("arrays must hold numeric or bool elements"));
        }
        if self.is_varargs() {
            if self.rank() != 1 {
                return Err(self.corrupt("varargs arrays must have rank 1"));
            }
            if self.length_field.is_none() {
                return Err(self.corrupt("varargs array without a length field"));
            }
        } else {
            if self.length_field.is_some() {
                return Err(self.corrupt("length field on a non-varargs field"));
            }
            if self
                .dimensions
                .iter()
                .any(|d| *d == 0 || *d == VARARGS_DIMENSION)
            {
                return Err(self.corrupt("invalid array dimension"));
            }
        }
        Ok(())
    }
}

/// A validated, immutable table of field descriptors for one block kind.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    kind: StructKind,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    varargs_slots: Vec<Option<usize>>,
    varargs_count: usize,
    size: usize,
}

impl FieldSchema {
    /// An empty schema of the given kind.
    pub fn empty(kind: StructKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
            index: HashMap::new(),
            varargs_slots: Vec::new(),
            varargs_count: 0,
            size: 0,
        }
    }

    /// Validate precomputed rows and build a schema from them.
    ///
    /// Rejects rows of the wrong kind and malformed or overlapping rows with `CorruptState`,
    /// and repeated names with `DuplicateName`.
    pub fn from_descriptors(kind: StructKind, rows: Vec<FieldDescriptor>) -> CoreResult<Self> {
        let mut index = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            if row.struct_kind != kind {
                return Err(CoreError::CorruptState(format!(
                    "field '{}' addresses a {} block but the schema describes a {} block",
                    row.name, row.struct_kind, kind
                )));
            }
            row.validate_shape()?;
            if index.insert(row.name.clone(), position).is_some() {
                return Err(CoreError::duplicate(Namespace::Field, row.name.clone()));
            }
        }

        for row in rows.iter().filter(|r| r.is_varargs()) {
            let length_name = row.length_field.as_deref().unwrap_or_default();
            let length = index.get(length_name).map(|i| &rows[*i]).ok_or_else(|| {
                CoreError::CorruptState(format!(
                    "varargs field '{}' names missing length field '{}'",
                    row.name, length_name
                ))
            })?;
            if !length.is_scalar() || !length.field_type.is_integer() {
                return Err(CoreError::CorruptState(format!(
                    "length field '{}' of '{}' must be an integer scalar",
                    length.name, row.name
                )));
            }
        }

        let mut spans: Vec<(usize, usize, &str)> = rows
            .iter()
            .filter(|r| r.block_len() > 0)
            .map(|r| (r.offset, r.offset + r.block_len(), r.name.as_str()))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(CoreError::CorruptState(format!(
                    "fields '{}' and '{}' overlap",
                    pair[0].2, pair[1].2
                )));
            }
        }
        let end = spans.iter().map(|s| s.1).max().unwrap_or(0);

        let mut varargs_count = 0;
        let varargs_slots = rows
            .iter()
            .map(|r| {
                r.is_varargs().then(|| {
                    varargs_count += 1;
                    varargs_count - 1
                })
            })
            .collect();

        Ok(Self {
            kind,
            fields: rows,
            index,
            varargs_slots,
            varargs_count,
            size: align_up(end, 8),
        })
    }

    /// Which block this schema lays out.
    pub fn kind(&self) -> StructKind {
        self.kind
    }

    /// Size in bytes of a block described by this schema.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Descriptors in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Iterate the descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Descriptor of the field named `name`.
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|i| &self.fields[*i])
    }

    /// True when a field named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn varargs_count(&self) -> usize {
        self.varargs_count
    }

    pub(crate) fn varargs_slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).and_then(|i| self.varargs_slots[*i])
    }

    /// Varargs fields whose length is held by `length_field`.
    pub fn dependents_of<'a>(
        &'a self,
        length_field: &'a str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.length_field.as_deref() == Some(length_field))
    }
}

impl PartialEq for FieldSchema {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.fields == other.fields
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Declarative schema construction with automatic offset layout.
///
/// ```
/// use beamline_core::field::{FieldFlags, FieldType, SchemaBuilder, StructKind};
///
/// let schema = SchemaBuilder::new(StructKind::Type)
///     .scalar("count", FieldType::Int32, FieldFlags::IN_DESCRIPTION)
///     .varargs("samples", FieldType::Double, "count", FieldFlags::empty())
///     .build()
///     .unwrap();
/// assert_eq!(schema.len(), 2);
/// ```
#[derive(Debug)]
pub struct SchemaBuilder {
    kind: StructKind,
    rows: Vec<FieldDescriptor>,
    cursor: usize,
    error: Option<CoreError>,
}

impl SchemaBuilder {
    /// An empty builder for a block of `kind`.
    pub fn new(kind: StructKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
            cursor: 0,
            error: None,
        }
    }

    fn push(
        mut self,
        name: &str,
        field_type: FieldType,
        dimensions: Vec<u32>,
        element_size: usize,
        flags: FieldFlags,
        length_field: Option<String>,
    ) -> Self {
        let offset = align_up(self.cursor, field_type.alignment());
        let row = FieldDescriptor {
            name: name.to_string(),
            field_type,
            dimensions,
            offset,
            element_size,
            flags,
            length_field,
            struct_kind: self.kind,
        };
        self.cursor = offset + row.block_len();
        self.rows.push(row);
        self
    }

    fn fail(mut self, error: CoreError) -> Self {
        self.error.get_or_insert(error);
        self
    }

    /// A scalar of a fixed-size type.
    pub fn scalar(self, name: &str, field_type: FieldType, flags: FieldFlags) -> Self {
        match field_type.natural_size() {
            Some(size) => self.push(name, field_type, Vec::new(), size, flags, None),
            None => self.fail(CoreError::invalid(
                name,
                format!("{field_type} fields need an explicit size"),
            )),
        }
    }

    /// A NUL padded string holding at most `capacity` bytes.
    pub fn string(self, name: &str, capacity: usize, flags: FieldFlags) -> Self {
        self.push(name, FieldType::String, Vec::new(), capacity, flags, None)
    }

    /// A record reference, stored as a fixed-size name.
    pub fn record_ref(self, name: &str, flags: FieldFlags) -> Self {
        self.push(
            name,
            FieldType::RecordRef,
            Vec::new(),
            RECORD_NAME_LENGTH,
            flags,
            None,
        )
    }

    /// A fixed array, row-major over `dimensions`.
    pub fn array(
        self,
        name: &str,
        field_type: FieldType,
        dimensions: &[u32],
        flags: FieldFlags,
    ) -> Self {
        match field_type.natural_size() {
            Some(size) if field_type.is_numeric_or_bool() => {
                self.push(name, field_type, dimensions.to_vec(), size, flags, None)
            }
            _ => self.fail(CoreError::invalid(
                name,
                format!("{field_type} cannot be used as an array element"),
            )),
        }
    }

    /// A one-dimensional array whose element count is held by `length_field`.
    pub fn varargs(
        self,
        name: &str,
        field_type: FieldType,
        length_field: &str,
        flags: FieldFlags,
    ) -> Self {
        match field_type.natural_size() {
            Some(size) if field_type.is_numeric_or_bool() => self.push(
                name,
                field_type,
                vec![VARARGS_DIMENSION],
                size,
                flags,
                Some(length_field.to_string()),
            ),
            _ => self.fail(CoreError::invalid(
                name,
                format!("{field_type} cannot be used as an array element"),
            )),
        }
    }

    /// An opaque byte field of `size` bytes.
    pub fn opaque(self, name: &str, size: usize, flags: FieldFlags) -> Self {
        self.push(name, FieldType::Opaque, Vec::new(), size, flags, None)
    }

    /// Validate the descriptors and build the schema.
    pub fn build(self) -> CoreResult<FieldSchema> {
        if let Some(error) = self.error {
            return Err(error);
        }
        FieldSchema::from_descriptors(self.kind, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_offsets_are_aligned() {
        let schema = SchemaBuilder::new(StructKind::Class)
            .scalar("flag", FieldType::Bool, FieldFlags::empty())
            .scalar("value", FieldType::Double, FieldFlags::empty())
            .string("units", 5, FieldFlags::empty())
            .scalar("count", FieldType::Int32, FieldFlags::empty())
            .build()
            .unwrap();

        let offsets: Vec<usize> = schema.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 24]);
        assert_eq!(schema.size(), 32);
    }

    #[test]
    fn test_mixed_struct_kinds_rejected() {
        let mut rows = SchemaBuilder::new(StructKind::Type)
            .scalar("a", FieldType::Int32, FieldFlags::empty())
            .build()
            .unwrap()
            .fields()
            .to_vec();
        rows[0].struct_kind = StructKind::Class;

        let err = FieldSchema::from_descriptors(StructKind::Type, rows).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptState);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = SchemaBuilder::new(StructKind::Type)
            .scalar("a", FieldType::Int32, FieldFlags::empty())
            .scalar("a", FieldType::Double, FieldFlags::empty())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
    }

    #[test]
    fn test_varargs_needs_integer_length_field() {
        let err = SchemaBuilder::new(StructKind::Type)
            .scalar("n", FieldType::Double, FieldFlags::empty())
            .varargs("data", FieldType::Double, "n", FieldFlags::empty())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptState);

        let err = SchemaBuilder::new(StructKind::Type)
            .varargs("data", FieldType::Double, "missing", FieldFlags::empty())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptState);
    }

    #[test]
    fn test_overlapping_rows_rejected() {
        let mut rows = SchemaBuilder::new(StructKind::Type)
            .scalar("a", FieldType::Int64, FieldFlags::empty())
            .scalar("b", FieldType::Int64, FieldFlags::empty())
            .build()
            .unwrap()
            .fields()
            .to_vec();
        rows[1].offset = 4;

        let err = FieldSchema::from_descriptors(StructKind::Type, rows).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_string_arrays_rejected() {
        let err = SchemaBuilder::new(StructKind::Type)
            .array("names", FieldType::String, &[4], FieldFlags::empty())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_varargs_occupy_no_block_bytes() {
        let schema = SchemaBuilder::new(StructKind::Type)
            .scalar("n", FieldType::UInt32, FieldFlags::empty())
            .varargs("data", FieldType::Double, "n", FieldFlags::empty())
            .varargs("more", FieldType::Int16, "n", FieldFlags::empty())
            .build()
            .unwrap();

        assert_eq!(schema.size(), 8);
        assert_eq!(schema.varargs_count(), 2);
        assert_eq!(schema.varargs_slot("more"), Some(1));
        assert_eq!(schema.dependents_of("n").count(), 2);
    }

    #[test]
    fn test_type_tags_round_trip() {
        for tag in 1..=14u8 {
            let ty = FieldType::from_tag(tag).unwrap();
            assert_eq!(ty.tag(), tag);
        }
        assert!(FieldType::from_tag(0).is_none());
    }
}
