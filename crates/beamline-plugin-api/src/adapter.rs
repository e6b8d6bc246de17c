//! Host-side adapters wrapping FFI objects in the core's driver and extension traits.

use std::sync::Arc;

use abi_stable::std_types::{RResult, RString, RVec};
use beamline_core::class::{AnalogInputOps, AnalogOutputOps, MceOps, MotorOps};
use beamline_core::field::{FieldDescriptor, FieldFlags, FieldSchema, FieldType, StructKind};
use beamline_core::{
    ClassOps, CoreError, CoreResult, Driver, DriverError, DriverErrorKind, Extension,
    MonitorStatus, Record, RecordClass, RecordLifecycle,
};
use tracing::debug;

use crate::ffi::{
    DriverFfiBox, ExtensionFfiBox, FfiError, FfiErrorKind, FfiFieldDescriptor, FfiFieldValue,
    FfiRecord, FfiReply, FfiVerb,
};

// =============================================================================
// Schema rows
// =============================================================================

/// Render a schema as FFI rows.
pub fn schema_rows(schema: &FieldSchema) -> RVec<FfiFieldDescriptor> {
    schema
        .iter()
        .map(|desc| FfiFieldDescriptor {
            name: RString::from(desc.name.as_str()),
            type_tag: desc.field_type.tag(),
            rank: desc.rank() as u32,
            dimensions: desc.dimensions.iter().copied().collect(),
            offset: desc.offset as u64,
            element_size: desc.element_size as u64,
            flags: desc.flags.bits(),
            struct_kind: desc.struct_kind as u8,
            length_field: desc
                .length_field
                .as_deref()
                .map(RString::from)
                .into(),
        })
        .collect()
}

fn descriptor_from_row(row: &FfiFieldDescriptor) -> CoreResult<FieldDescriptor> {
    let name = row.name.to_string();
    let corrupt = |what: &str| CoreError::CorruptState(format!("field '{}': {}", name, what));
    let field_type = FieldType::from_tag(row.type_tag)
        .ok_or_else(|| corrupt(&format!("unknown type tag {}", row.type_tag)))?;
    if row.rank as usize != row.dimensions.len() {
        return Err(corrupt(&format!(
            "rank {} does not match {} dimensions",
            row.rank,
            row.dimensions.len()
        )));
    }
    let flags = FieldFlags::from_bits(row.flags)
        .ok_or_else(|| corrupt(&format!("unknown flag bits {:#x}", row.flags)))?;
    let struct_kind = StructKind::from_tag(row.struct_kind)
        .ok_or_else(|| corrupt(&format!("unknown struct kind {}", row.struct_kind)))?;
    let offset = usize::try_from(row.offset).map_err(|_| corrupt("offset overflows"))?;
    let element_size =
        usize::try_from(row.element_size).map_err(|_| corrupt("element size overflows"))?;
    Ok(FieldDescriptor {
        name,
        field_type,
        dimensions: row.dimensions.to_vec(),
        offset,
        element_size,
        flags,
        length_field: row.length_field.as_ref().map(|f| f.to_string()).into_option(),
        struct_kind,
    })
}

/// Rebuild and validate a schema from FFI rows.
pub fn schema_from_rows(kind: StructKind, rows: &[FfiFieldDescriptor]) -> CoreResult<FieldSchema> {
    let descriptors = rows
        .iter()
        .map(descriptor_from_row)
        .collect::<CoreResult<Vec<_>>>()?;
    FieldSchema::from_descriptors(kind, descriptors)
}

// =============================================================================
// Drivers
// =============================================================================

struct FfiDriver {
    inner: DriverFfiBox,
    type_name: String,
}

fn ffi_failure(type_name: &str, err: FfiError) -> CoreError {
    let kind = match err.kind {
        FfiErrorKind::InvalidValue => {
            return CoreError::InvalidValue {
                field: type_name.to_string(),
                message: err.message.to_string(),
            }
        }
        FfiErrorKind::FieldNotFound => return CoreError::FieldNotFound(err.message.to_string()),
        FfiErrorKind::Hardware => DriverErrorKind::Hardware,
        FfiErrorKind::Unsupported | FfiErrorKind::Other => DriverErrorKind::Unknown,
    };
    DriverError::new(type_name, kind, err.message.to_string()).into()
}

impl FfiDriver {
    fn snapshot(record: &Record) -> CoreResult<FfiRecord> {
        let mut fields = RVec::new();
        for name in record.field_names() {
            let text = record.get_field(name)?.to_string();
            fields.push(FfiFieldValue {
                name: RString::from(name),
                text: RString::from(text),
            });
        }
        Ok(FfiRecord {
            name: RString::from(record.name()),
            fields,
        })
    }

    /// Invoke `verb`, apply the reply's field updates and return the reply.
    fn call(&self, verb: FfiVerb, record: &mut Record, argument: f64) -> CoreResult<FfiReply> {
        if !self.inner.supports(verb) {
            return Err(record.unsupported(verb.name()));
        }
        let snapshot = Self::snapshot(record)?;
        let reply = match self.inner.invoke(verb, snapshot, argument) {
            RResult::ROk(reply) => reply,
            RResult::RErr(err) if err.kind == FfiErrorKind::Unsupported => {
                return Err(record.unsupported(verb.name()))
            }
            RResult::RErr(err) => return Err(ffi_failure(&self.type_name, err)),
        };
        record.store_field_texts(
            reply
                .updates
                .iter()
                .map(|u| (u.name.as_str(), u.text.as_str())),
        )?;
        debug!(record = %record.name(), verb = verb.name(), "Plugin verb completed");
        Ok(reply)
    }
}

struct Adapter(Arc<FfiDriver>);

impl RecordLifecycle for Adapter {
    fn open(&self, record: &mut Record) -> CoreResult<()> {
        if !self.0.inner.supports(FfiVerb::Open) {
            return Ok(());
        }
        self.0.call(FfiVerb::Open, record, 0.0).map(drop)
    }

    fn close(&self, record: &mut Record) -> CoreResult<()> {
        if !self.0.inner.supports(FfiVerb::Close) {
            return Ok(());
        }
        self.0.call(FfiVerb::Close, record, 0.0).map(drop)
    }
}

impl MotorOps for Adapter {
    fn move_absolute(&self, record: &mut Record, destination: f64) -> CoreResult<()> {
        self.0.call(FfiVerb::MoveAbsolute, record, destination).map(drop)
    }

    fn get_position(&self, record: &mut Record) -> CoreResult<f64> {
        Ok(self.0.call(FfiVerb::GetPosition, record, 0.0)?.value)
    }

    fn soft_abort(&self, record: &mut Record) -> CoreResult<()> {
        self.0.call(FfiVerb::SoftAbort, record, 0.0).map(drop)
    }

    fn home(&self, record: &mut Record, direction: i32) -> CoreResult<()> {
        self.0.call(FfiVerb::Home, record, f64::from(direction)).map(drop)
    }
}

impl AnalogInputOps for Adapter {
    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        Ok(self.0.call(FfiVerb::ReadRaw, record, 0.0)?.value)
    }
}

impl AnalogOutputOps for Adapter {
    fn write_raw(&self, record: &mut Record, raw: f64) -> CoreResult<()> {
        self.0.call(FfiVerb::WriteRaw, record, raw).map(drop)
    }

    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        Ok(self.0.call(FfiVerb::ReadRaw, record, 0.0)?.value)
    }
}

impl MceOps for Adapter {
    fn start(&self, record: &mut Record) -> CoreResult<()> {
        self.0.call(FfiVerb::Start, record, 0.0).map(drop)
    }

    fn stop(&self, record: &mut Record) -> CoreResult<()> {
        self.0.call(FfiVerb::Stop, record, 0.0).map(drop)
    }

    fn clear(&self, record: &mut Record) -> CoreResult<()> {
        self.0.call(FfiVerb::Clear, record, 0.0).map(drop)
    }

    fn status(&self, record: &Record) -> CoreResult<MonitorStatus> {
        // Status must not mutate the record, so updates in the reply are ignored.
        if !self.0.inner.supports(FfiVerb::Status) {
            return Err(record.unsupported(FfiVerb::Status.name()));
        }
        let snapshot = FfiDriver::snapshot(record)?;
        match self.0.inner.invoke(FfiVerb::Status, snapshot, 0.0) {
            RResult::ROk(reply) => Ok(MonitorStatus::from_u8(reply.value as u8)),
            RResult::RErr(err) => Err(ffi_failure(&self.0.type_name, err)),
        }
    }

    fn read(&self, record: &mut Record) -> CoreResult<Vec<f64>> {
        Ok(self.0.call(FfiVerb::Read, record, 0.0)?.values.into_vec())
    }
}

/// Wrap a plugin driver as a core [`Driver`].
pub fn driver_from_ffi(inner: DriverFfiBox) -> CoreResult<Driver> {
    let type_name = inner.type_name().into_string();
    let class = RecordClass::from_tag(inner.class_tag()).ok_or_else(|| {
        CoreError::CorruptState(format!(
            "driver '{}' declares unknown class tag {}",
            type_name,
            inner.class_tag()
        ))
    })?;
    let schema = schema_from_rows(StructKind::Type, &inner.fields())?;
    let shared = Arc::new(FfiDriver {
        inner,
        type_name: type_name.clone(),
    });

    let class_ops = match class {
        RecordClass::Motor => ClassOps::Motor(Arc::new(Adapter(Arc::clone(&shared)))),
        RecordClass::AnalogInput => ClassOps::AnalogInput(Arc::new(Adapter(Arc::clone(&shared)))),
        RecordClass::AnalogOutput => {
            ClassOps::AnalogOutput(Arc::new(Adapter(Arc::clone(&shared))))
        }
        RecordClass::Mce => ClassOps::Mce(Arc::new(Adapter(Arc::clone(&shared)))),
        RecordClass::Variable => ClassOps::Variable,
    };
    Driver::builder(type_name, class)
        .lifecycle(Adapter(shared))
        .class_ops(class_ops)
        .type_schema(schema)
        .build()
}

// =============================================================================
// Extensions
// =============================================================================

struct ExtensionAdapter {
    inner: ExtensionFfiBox,
    name: String,
}

impl ExtensionAdapter {
    fn convert<T>(&self, operation: &'static str, result: RResult<T, FfiError>) -> CoreResult<T> {
        match result {
            RResult::ROk(value) => Ok(value),
            RResult::RErr(err) if err.kind == FfiErrorKind::Unsupported => {
                Err(CoreError::UnsupportedOperation {
                    target: format!("extension '{}'", self.name),
                    operation,
                })
            }
            RResult::RErr(err) => Err(ffi_failure(&self.name, err)),
        }
    }
}

impl Extension for ExtensionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> CoreResult<()> {
        let result = self.inner.initialize();
        self.convert("initialize", result)
    }

    fn finalize(&mut self) -> CoreResult<()> {
        let result = self.inner.finalize();
        self.convert("finalize", result)
    }

    fn call(&mut self, args: &[String]) -> CoreResult<String> {
        let args = args.iter().map(|a| RString::from(a.as_str())).collect();
        let result = self.inner.call(args);
        self.convert("call", result).map(RString::into_string)
    }

    fn call_string(&mut self, text: &str) -> CoreResult<String> {
        let result = self.inner.call_string(RString::from(text));
        self.convert("call_string", result).map(RString::into_string)
    }
}

/// Wrap a plugin extension as a core [`Extension`].
pub fn extension_from_ffi(inner: ExtensionFfiBox) -> Box<dyn Extension> {
    let name = inner.name().into_string();
    Box::new(ExtensionAdapter { inner, name })
}
