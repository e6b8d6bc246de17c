//! Generic field access engine.
//!
//! [`FieldBlock`] owns one payload block and the schema describing it. It is the only place
//! in the crate that turns a field name into byte offsets: every read and write goes through
//! the descriptor lookup, bounds checks and native-endian codecs below.
//!
//! Writes are validated completely (type coercion, range, capacity and read-only checks)
//! before a single byte changes, so a failed write always leaves the block as it was.

use std::sync::Arc;

use super::schema::{FieldDescriptor, FieldFlags, FieldSchema, FieldType, StructKind};
use super::value::FieldValue;
use crate::error::{CoreError, CoreResult};

/// Largest storage, in bytes, a single varargs field may reserve.
pub const MAX_VARARGS_BYTES: usize = 256 * 1024 * 1024;

/// An owned payload block addressed through a [`FieldSchema`].
#[derive(Debug, Clone)]
pub struct FieldBlock {
    schema: Arc<FieldSchema>,
    bytes: Vec<u8>,
    /// Storage of each varargs field, indexed by its slot in the schema.
    varargs: Vec<Vec<u8>>,
}

/// Encoded bytes ready to be copied into place.
struct Patch {
    at: Target,
    bytes: Vec<u8>,
}

enum Target {
    Block(usize),
    Varargs { slot: usize, offset: usize },
    /// Whole varargs storage replaced from offset 0; capacity is unchanged.
    VarargsPrefix(usize),
}

impl FieldBlock {
    /// Allocate a zeroed block for `schema`. Varargs fields start with zero capacity.
    pub fn allocate(schema: Arc<FieldSchema>) -> CoreResult<Self> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(schema.size()).map_err(|_| {
            CoreError::OutOfMemory(format!("allocating a {} byte {} block", schema.size(), schema.kind()))
        })?;
        bytes.resize(schema.size(), 0);
        let varargs = vec![Vec::new(); schema.varargs_count()];
        Ok(Self {
            schema,
            bytes,
            varargs,
        })
    }

    /// Wrap existing block bytes. The length must match the schema size.
    pub fn from_bytes(schema: Arc<FieldSchema>, bytes: Vec<u8>) -> CoreResult<Self> {
        if bytes.len() != schema.size() {
            return Err(CoreError::CorruptState(format!(
                "{} block is {} bytes, schema expects {}",
                schema.kind(),
                bytes.len(),
                schema.size()
            )));
        }
        let varargs = vec![Vec::new(); schema.varargs_count()];
        Ok(Self {
            schema,
            bytes,
            varargs,
        })
    }

    /// The schema this block is laid out by.
    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    /// Whether this is a class or a type block.
    pub fn kind(&self) -> StructKind {
        self.schema.kind()
    }

    /// The fixed part of the block. Varargs storage is not included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Replace the fixed part of the block with `bytes` of identical length.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> CoreResult<()> {
        if bytes.len() != self.bytes.len() {
            return Err(CoreError::CorruptState(format!(
                "cannot load {} bytes into a {} byte {} block",
                bytes.len(),
                self.bytes.len(),
                self.kind()
            )));
        }
        self.bytes.copy_from_slice(bytes);
        Ok(())
    }

    /// Descriptor of the field named `name`.
    pub fn descriptor(&self, name: &str) -> CoreResult<&FieldDescriptor> {
        self.schema
            .get(name)
            .ok_or_else(|| CoreError::FieldNotFound(name.to_string()))
    }

    fn checked_descriptor(&self, name: &str) -> CoreResult<FieldDescriptor> {
        let descriptor = self.descriptor(name)?;
        if descriptor.struct_kind != self.kind() {
            return Err(CoreError::CorruptState(format!(
                "field '{}' describes a {} block, not a {} block",
                name,
                descriptor.struct_kind,
                self.kind()
            )));
        }
        Ok(descriptor.clone())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a whole field. Arrays are returned nested once per dimension.
    pub fn get(&self, name: &str) -> CoreResult<FieldValue> {
        let desc = self.checked_descriptor(name)?;
        if desc.is_scalar() {
            return self.read_element(&desc, 0);
        }
        let count = self.length_of(name)?;
        let elements = (0..count)
            .map(|i| self.read_element(&desc, i))
            .collect::<CoreResult<Vec<_>>>()?;
        if desc.is_varargs() {
            return Ok(FieldValue::Array(elements));
        }
        Ok(nest(elements, &desc.dimensions))
    }

    /// Read one element of an array field. Scalars accept an empty index.
    pub fn get_element(&self, name: &str, index: &[usize]) -> CoreResult<FieldValue> {
        let desc = self.checked_descriptor(name)?;
        let linear = self.linear_index(&desc, index)?;
        self.read_element(&desc, linear)
    }

    /// Read a numeric scalar as `f64`.
    pub fn get_f64(&self, name: &str) -> CoreResult<f64> {
        let value = self.get(name)?;
        value
            .as_f64()
            .ok_or_else(|| CoreError::invalid(name, "not a numeric field"))
    }

    /// Read an integer scalar as `i64`.
    pub fn get_i64(&self, name: &str) -> CoreResult<i64> {
        let value = self.get(name)?;
        value
            .as_i64()
            .ok_or_else(|| CoreError::invalid(name, "not an integer field"))
    }

    /// Read a boolean scalar.
    pub fn get_bool(&self, name: &str) -> CoreResult<bool> {
        let value = self.get(name)?;
        value
            .as_bool()
            .ok_or_else(|| CoreError::invalid(name, "not a boolean field"))
    }

    /// Read a string or record reference field.
    pub fn get_string(&self, name: &str) -> CoreResult<String> {
        match self.get(name)? {
            FieldValue::String(s) | FieldValue::RecordRef(s) => Ok(s),
            _ => Err(CoreError::invalid(name, "not a text field")),
        }
    }

    /// Current element count: 1 for scalars, the product of the dimensions for fixed
    /// arrays, and the value of the length field for varargs arrays.
    pub fn length_of(&self, name: &str) -> CoreResult<usize> {
        let desc = self.checked_descriptor(name)?;
        match desc.fixed_count() {
            Some(count) => Ok(count),
            None => {
                let length = self.varargs_length(&desc)?;
                let capacity = self.varargs_capacity(&desc)?;
                if length > capacity {
                    return Err(CoreError::CorruptState(format!(
                        "varargs field '{}' has length {} but capacity {}",
                        name, length, capacity
                    )));
                }
                Ok(length)
            }
        }
    }

    /// Number of elements storage exists for.
    pub fn capacity_of(&self, name: &str) -> CoreResult<usize> {
        let desc = self.checked_descriptor(name)?;
        match desc.fixed_count() {
            Some(count) => Ok(count),
            None => self.varargs_capacity(&desc),
        }
    }

    fn varargs_slot(&self, desc: &FieldDescriptor) -> CoreResult<usize> {
        self.schema.varargs_slot(&desc.name).ok_or_else(|| {
            CoreError::CorruptState(format!("no storage slot for varargs field '{}'", desc.name))
        })
    }

    fn varargs_capacity(&self, desc: &FieldDescriptor) -> CoreResult<usize> {
        let slot = self.varargs_slot(desc)?;
        Ok(self.varargs[slot].len() / desc.element_size)
    }

    fn varargs_length(&self, desc: &FieldDescriptor) -> CoreResult<usize> {
        let length_name = desc.length_field.as_deref().unwrap_or_default();
        let length_desc = self.checked_descriptor(length_name)?;
        let raw = self.read_element(&length_desc, 0)?;
        raw.as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                CoreError::CorruptState(format!(
                    "length field '{}' holds invalid length {}",
                    length_name, raw
                ))
            })
    }

    fn linear_index(&self, desc: &FieldDescriptor, index: &[usize]) -> CoreResult<usize> {
        if index.len() != desc.rank() {
            return Err(CoreError::invalid(
                &desc.name,
                format!("expected {} indices, got {}", desc.rank(), index.len()),
            ));
        }
        if desc.is_varargs() {
            let length = self.length_of(&desc.name)?;
            if index[0] >= length {
                return Err(CoreError::IndexOutOfRange {
                    field: desc.name.clone(),
                    index: index[0],
                    length,
                });
            }
            return Ok(index[0]);
        }
        let mut linear = 0;
        for (i, dim) in index.iter().zip(&desc.dimensions) {
            let dim = *dim as usize;
            if *i >= dim {
                return Err(CoreError::IndexOutOfRange {
                    field: desc.name.clone(),
                    index: *i,
                    length: dim,
                });
            }
            linear = linear * dim + i;
        }
        Ok(linear)
    }

    fn element_bytes(&self, desc: &FieldDescriptor, linear: usize) -> CoreResult<&[u8]> {
        let start = linear * desc.element_size;
        let end = start + desc.element_size;
        let storage = if desc.is_varargs() {
            &self.varargs[self.varargs_slot(desc)?][..]
        } else {
            &self.bytes[desc.offset..]
        };
        storage.get(start..end).ok_or_else(|| {
            CoreError::CorruptState(format!("field '{}' lies outside its block", desc.name))
        })
    }

    fn read_element(&self, desc: &FieldDescriptor, linear: usize) -> CoreResult<FieldValue> {
        decode(desc.field_type, self.element_bytes(desc, linear)?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write a whole field on behalf of a client. Read-only fields are rejected.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> CoreResult<()> {
        self.reject_read_only(name)?;
        self.store(name, value)
    }

    /// Write one element on behalf of a client. Read-only fields are rejected.
    pub fn set_element(
        &mut self,
        name: &str,
        index: &[usize],
        value: impl Into<FieldValue>,
    ) -> CoreResult<()> {
        self.reject_read_only(name)?;
        self.store_element(name, index, value)
    }

    fn reject_read_only(&self, name: &str) -> CoreResult<()> {
        if self.descriptor(name)?.flags.contains(FieldFlags::READ_ONLY) {
            return Err(CoreError::FieldReadOnly(name.to_string()));
        }
        Ok(())
    }

    /// Write a whole field ignoring the read-only flag. Drivers use this for the
    /// fields they own.
    ///
    /// Writing a varargs array stores the elements and sets its length field to the
    /// number of elements written.
    pub fn store(&mut self, name: &str, value: impl Into<FieldValue>) -> CoreResult<()> {
        let desc = self.checked_descriptor(name)?;
        let value = value.into();
        let patches = if desc.is_scalar() {
            let encoded = encode(&desc, &value)?;
            self.check_length_change(&desc, &value)?;
            vec![Patch {
                at: Target::Block(desc.offset),
                bytes: encoded,
            }]
        } else if desc.is_varargs() {
            self.plan_varargs(&desc, value)?
        } else {
            let elements = value.flatten();
            let count = desc.fixed_count().unwrap_or_default();
            if elements.len() != count {
                return Err(CoreError::invalid(
                    name,
                    format!("expected {} elements, got {}", count, elements.len()),
                ));
            }
            let mut bytes = Vec::with_capacity(desc.block_len());
            for element in &elements {
                bytes.extend(encode(&desc, element)?);
            }
            vec![Patch {
                at: Target::Block(desc.offset),
                bytes,
            }]
        };
        self.apply(patches);
        Ok(())
    }

    /// Write one element ignoring the read-only flag.
    pub fn store_element(
        &mut self,
        name: &str,
        index: &[usize],
        value: impl Into<FieldValue>,
    ) -> CoreResult<()> {
        let desc = self.checked_descriptor(name)?;
        let value = value.into();
        let linear = self.linear_index(&desc, index)?;
        let bytes = encode(&desc, &value)?;
        if desc.is_scalar() {
            self.check_length_change(&desc, &value)?;
        }
        let at = if desc.is_varargs() {
            Target::Varargs {
                slot: self.varargs_slot(&desc)?,
                offset: linear * desc.element_size,
            }
        } else {
            Target::Block(desc.offset + linear * desc.element_size)
        };
        self.apply(vec![Patch { at, bytes }]);
        Ok(())
    }

    /// When `desc` is a length field, check the new length fits every dependent array.
    fn check_length_change(&self, desc: &FieldDescriptor, value: &FieldValue) -> CoreResult<()> {
        let dependents: Vec<FieldDescriptor> =
            self.schema.dependents_of(&desc.name).cloned().collect();
        if dependents.is_empty() {
            return Ok(());
        }
        let length = value
            .coerce(&desc.name, desc.field_type)?
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CoreError::invalid(&desc.name, "lengths cannot be negative"))?;
        for dependent in &dependents {
            let capacity = self.varargs_capacity(dependent)?;
            if length > capacity {
                return Err(CoreError::IndexOutOfRange {
                    field: dependent.name.clone(),
                    index: length,
                    length: capacity,
                });
            }
        }
        Ok(())
    }

    fn plan_varargs(&self, desc: &FieldDescriptor, value: FieldValue) -> CoreResult<Vec<Patch>> {
        let elements = value.flatten();
        let length_name = desc.length_field.clone().unwrap_or_default();
        let length_desc = self.checked_descriptor(&length_name)?;
        let new_length = FieldValue::UInt64(elements.len() as u64);

        // The new length must also fit sibling arrays sharing the length field.
        self.check_length_change(&length_desc, &new_length)?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(elements.len() * desc.element_size)
            .map_err(|_| CoreError::OutOfMemory(format!("encoding field '{}'", desc.name)))?;
        for element in &elements {
            bytes.extend(encode(desc, element)?);
        }
        Ok(vec![
            Patch {
                at: Target::VarargsPrefix(self.varargs_slot(desc)?),
                bytes,
            },
            Patch {
                at: Target::Block(length_desc.offset),
                bytes: encode(&length_desc, &new_length)?,
            },
        ])
    }

    fn apply(&mut self, patches: Vec<Patch>) {
        for patch in patches {
            let len = patch.bytes.len();
            match patch.at {
                Target::Block(offset) => {
                    self.bytes[offset..offset + len].copy_from_slice(&patch.bytes)
                }
                Target::Varargs { slot, offset } => {
                    self.varargs[slot][offset..offset + len].copy_from_slice(&patch.bytes)
                }
                Target::VarargsPrefix(slot) => {
                    self.varargs[slot][..len].copy_from_slice(&patch.bytes)
                }
            }
        }
    }

    /// Set the storage capacity of a varargs field, preserving existing elements.
    ///
    /// The capacity cannot drop below the current length, and the storage cannot exceed
    /// [`MAX_VARARGS_BYTES`].
    pub fn reserve_varargs(&mut self, name: &str, capacity: usize) -> CoreResult<()> {
        let desc = self.checked_descriptor(name)?;
        if !desc.is_varargs() {
            return Err(CoreError::invalid(name, "not a varargs field"));
        }
        let length = self.varargs_length(&desc)?;
        if capacity < length {
            return Err(CoreError::invalid(
                name,
                format!("capacity {} is below the current length {}", capacity, length),
            ));
        }
        let slot = self.varargs_slot(&desc)?;
        let bytes = capacity
            .checked_mul(desc.element_size)
            .filter(|b| *b <= MAX_VARARGS_BYTES)
            .ok_or_else(|| {
                CoreError::OutOfMemory(format!(
                    "reserving {} elements for '{}' exceeds the {} byte varargs limit",
                    capacity, name, MAX_VARARGS_BYTES
                ))
            })?;
        let storage = &mut self.varargs[slot];
        if bytes > storage.len() {
            storage
                .try_reserve_exact(bytes - storage.len())
                .map_err(|_| {
                    CoreError::OutOfMemory(format!("reserving {} elements for '{}'", capacity, name))
                })?;
        }
        storage.resize(bytes, 0);
        Ok(())
    }
}

fn nest(elements: Vec<FieldValue>, dimensions: &[u32]) -> FieldValue {
    if dimensions.len() <= 1 {
        return FieldValue::Array(elements);
    }
    let inner: usize = dimensions[1..].iter().map(|d| *d as usize).product();
    let mut rows = Vec::with_capacity(dimensions[0] as usize);
    let mut iter = elements.into_iter();
    for _ in 0..dimensions[0] {
        let chunk: Vec<FieldValue> = iter.by_ref().take(inner).collect();
        rows.push(nest(chunk, &dimensions[1..]));
    }
    FieldValue::Array(rows)
}

fn fixed<const N: usize>(bytes: &[u8]) -> CoreResult<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        CoreError::CorruptState(format!("expected {} bytes, found {}", N, bytes.len()))
    })
}

fn decode(field_type: FieldType, bytes: &[u8]) -> CoreResult<FieldValue> {
    Ok(match field_type {
        FieldType::Bool => FieldValue::Bool(bytes.first().is_some_and(|b| *b != 0)),
        FieldType::Int8 => FieldValue::Int8(i8::from_ne_bytes(fixed(bytes)?)),
        FieldType::UInt8 => FieldValue::UInt8(u8::from_ne_bytes(fixed(bytes)?)),
        FieldType::Int16 => FieldValue::Int16(i16::from_ne_bytes(fixed(bytes)?)),
        FieldType::UInt16 => FieldValue::UInt16(u16::from_ne_bytes(fixed(bytes)?)),
        FieldType::Int32 => FieldValue::Int32(i32::from_ne_bytes(fixed(bytes)?)),
        FieldType::UInt32 => FieldValue::UInt32(u32::from_ne_bytes(fixed(bytes)?)),
        FieldType::Int64 => FieldValue::Int64(i64::from_ne_bytes(fixed(bytes)?)),
        FieldType::UInt64 => FieldValue::UInt64(u64::from_ne_bytes(fixed(bytes)?)),
        FieldType::Float => FieldValue::Float(f32::from_ne_bytes(fixed(bytes)?)),
        FieldType::Double => FieldValue::Double(f64::from_ne_bytes(fixed(bytes)?)),
        FieldType::String => FieldValue::String(read_text(bytes)),
        FieldType::RecordRef => FieldValue::RecordRef(read_text(bytes)),
        FieldType::Opaque => FieldValue::Bytes(bytes.to_vec()),
    })
}

fn read_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Coerce `value` to the field's element type and encode it as `element_size` bytes.
fn encode(desc: &FieldDescriptor, value: &FieldValue) -> CoreResult<Vec<u8>> {
    let value = value.coerce(&desc.name, desc.field_type)?;
    let bytes = match value {
        FieldValue::Bool(v) => vec![u8::from(v)],
        FieldValue::Int8(v) => v.to_ne_bytes().to_vec(),
        FieldValue::UInt8(v) => v.to_ne_bytes().to_vec(),
        FieldValue::Int16(v) => v.to_ne_bytes().to_vec(),
        FieldValue::UInt16(v) => v.to_ne_bytes().to_vec(),
        FieldValue::Int32(v) => v.to_ne_bytes().to_vec(),
        FieldValue::UInt32(v) => v.to_ne_bytes().to_vec(),
        FieldValue::Int64(v) => v.to_ne_bytes().to_vec(),
        FieldValue::UInt64(v) => v.to_ne_bytes().to_vec(),
        FieldValue::Float(v) => v.to_ne_bytes().to_vec(),
        FieldValue::Double(v) => v.to_ne_bytes().to_vec(),
        FieldValue::String(text) | FieldValue::RecordRef(text) => {
            padded(&desc.name, text.as_bytes(), desc.element_size)?
        }
        FieldValue::Bytes(raw) => padded(&desc.name, &raw, desc.element_size)?,
        FieldValue::Array(_) => {
            return Err(CoreError::invalid(&desc.name, "expected a single element"))
        }
    };
    Ok(bytes)
}

fn padded(field: &str, raw: &[u8], capacity: usize) -> CoreResult<Vec<u8>> {
    if raw.len() > capacity {
        return Err(CoreError::invalid(
            field,
            format!("{} bytes exceed the capacity of {}", raw.len(), capacity),
        ));
    }
    let mut bytes = raw.to_vec();
    bytes.resize(capacity, 0);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::field::SchemaBuilder;

    fn block() -> FieldBlock {
        let schema = SchemaBuilder::new(StructKind::Type)
            .scalar("gain", FieldType::Double, FieldFlags::empty())
            .scalar("serial", FieldType::UInt32, FieldFlags::READ_ONLY)
            .string("label", 8, FieldFlags::empty())
            .array("matrix", FieldType::Int16, &[2, 3], FieldFlags::empty())
            .scalar("count", FieldType::UInt16, FieldFlags::empty())
            .varargs("samples", FieldType::Float, "count", FieldFlags::empty())
            .opaque("blob", 4, FieldFlags::empty())
            .build()
            .unwrap();
        FieldBlock::allocate(Arc::new(schema)).unwrap()
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut b = block();
        b.set("gain", 2.5).unwrap();
        assert_eq!(b.get("gain").unwrap(), FieldValue::Double(2.5));
        assert_eq!(b.get_f64("gain").unwrap(), 2.5);
    }

    #[test]
    fn test_read_only_rejected_and_untouched() {
        let mut b = block();
        b.store("serial", 7u32).unwrap();
        let before = b.as_bytes().to_vec();

        let err = b.set("serial", 9u32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldReadOnly);
        assert_eq!(b.as_bytes(), &before[..]);
        assert_eq!(b.get_i64("serial").unwrap(), 7);
    }

    #[test]
    fn test_string_capacity() {
        let mut b = block();
        b.set("label", "12345678").unwrap();
        assert_eq!(b.get_string("label").unwrap(), "12345678");
        b.set("label", "").unwrap();
        assert_eq!(b.get_string("label").unwrap(), "");
        assert!(b.set("label", "123456789").is_err());
    }

    #[test]
    fn test_fixed_array_elements() {
        let mut b = block();
        b.set_element("matrix", &[1, 2], -4i16).unwrap();
        assert_eq!(
            b.get_element("matrix", &[1, 2]).unwrap(),
            FieldValue::Int16(-4)
        );

        let err = b.get_element("matrix", &[2, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        let err = b.get_element("matrix", &[0, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(
            b.get_element("matrix", &[0]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );

        match b.get("matrix").unwrap() {
            FieldValue::Array(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[1], FieldValue::from(vec![0i16, 0, -4]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_whole_array_write_is_atomic() {
        let mut b = block();
        b.set("matrix", vec![1i16, 2, 3, 4, 5, 6]).unwrap();
        let before = b.as_bytes().to_vec();

        let err = b
            .set("matrix", vec![1i64, 2, 3, 4, 5, 70_000])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(b.as_bytes(), &before[..]);
    }

    #[test]
    fn test_varargs_follow_length_field() {
        let mut b = block();
        b.reserve_varargs("samples", 4).unwrap();
        b.set("count", 3u16).unwrap();

        for i in 0..3 {
            b.set_element("samples", &[i], i as f32).unwrap();
        }
        let err = b.set_element("samples", &[3], 1.0f32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(b.get("samples").unwrap(), FieldValue::from(vec![0f32, 1.0, 2.0]));
    }

    #[test]
    fn test_length_beyond_capacity_rejected() {
        let mut b = block();
        b.reserve_varargs("samples", 2).unwrap();
        let err = b.set("count", 3u16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(b.length_of("samples").unwrap(), 0);
    }

    #[test]
    fn test_whole_varargs_write_updates_length() {
        let mut b = block();
        b.reserve_varargs("samples", 3).unwrap();
        b.set("samples", vec![1.0f32, 2.0]).unwrap();
        assert_eq!(b.get_i64("count").unwrap(), 2);

        let err = b.set("samples", vec![1.0f32; 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(b.get_i64("count").unwrap(), 2);
    }

    #[test]
    fn test_reserve_cannot_shrink_below_length() {
        let mut b = block();
        b.reserve_varargs("samples", 3).unwrap();
        b.set("samples", vec![1.0f32, 2.0, 3.0]).unwrap();
        assert!(b.reserve_varargs("samples", 2).is_err());
        b.reserve_varargs("samples", 8).unwrap();
        assert_eq!(b.capacity_of("samples").unwrap(), 8);
        assert_eq!(b.get_element("samples", &[2]).unwrap(), FieldValue::Float(3.0));
    }

    #[test]
    fn test_oversized_reserve_is_refused() {
        let mut b = block();
        let err = b.reserve_varargs("samples", usize::MAX / 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        let err = b
            .reserve_varargs("samples", MAX_VARARGS_BYTES / 4 + 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        assert_eq!(b.capacity_of("samples").unwrap(), 0);

        b.reserve_varargs("samples", MAX_VARARGS_BYTES / 4 / 1024).unwrap();
        assert_eq!(b.capacity_of("samples").unwrap(), MAX_VARARGS_BYTES / 4 / 1024);
    }

    #[test]
    fn test_opaque_bytes() {
        let mut b = block();
        b.set("blob", FieldValue::Bytes(vec![1, 2])).unwrap();
        assert_eq!(b.get("blob").unwrap(), FieldValue::Bytes(vec![1, 2, 0, 0]));
    }

    #[test]
    fn test_unknown_field() {
        let b = block();
        assert_eq!(b.get("nope").unwrap_err().kind(), ErrorKind::FieldNotFound);
    }

    #[test]
    fn test_from_bytes_checks_size() {
        let b = block();
        let schema = b.schema().clone();
        assert!(FieldBlock::from_bytes(schema.clone(), vec![0; 3]).is_err());
        let copy = FieldBlock::from_bytes(schema, b.as_bytes().to_vec()).unwrap();
        assert_eq!(copy.as_bytes(), b.as_bytes());
    }
}
