//! Analog output class.

use std::sync::Arc;

use crate::driver::ClassOps;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::field::{FieldFlags, FieldSchema, FieldType, SchemaBuilder, StructKind};
use crate::record::Record;

/// Standard analog output class block. Same shape as the analog input block.
pub fn schema() -> CoreResult<FieldSchema> {
    SchemaBuilder::new(StructKind::Class)
        .scalar("raw_value", FieldType::Double, FieldFlags::READ_ONLY)
        .scalar(
            "value",
            FieldType::Double,
            FieldFlags::READ_ONLY | FieldFlags::IN_SUMMARY,
        )
        .scalar("scale", FieldType::Double, FieldFlags::IN_DESCRIPTION)
        .scalar("offset", FieldType::Double, FieldFlags::IN_DESCRIPTION)
        .string(
            "units",
            16,
            FieldFlags::IN_DESCRIPTION | FieldFlags::IN_SUMMARY,
        )
        .build()
}

/// Analog output verbs. Every verb defaults to `UnsupportedOperation`.
pub trait AnalogOutputOps: Send + Sync {
    fn write_raw(&self, record: &mut Record, _raw: f64) -> CoreResult<()> {
        Err(record.unsupported("write_raw"))
    }

    /// Read back the raw output. Optional; without it the last written value is reported.
    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        Err(record.unsupported("read_raw"))
    }
}

fn ops(record: &Record) -> CoreResult<Arc<dyn AnalogOutputOps>> {
    match record.driver().class_ops() {
        ClassOps::AnalogOutput(ops) => Ok(Arc::clone(ops)),
        other => Err(CoreError::CorruptState(format!(
            "record '{}' has a {} table, not an analog output table",
            record.name(),
            other.class()
        ))),
    }
}

/// Convert `value` to a raw setting and write it.
pub fn write(record: &mut Record, value: f64) -> CoreResult<()> {
    let ops = ops(record)?;
    let scale = record.get_f64("scale")?;
    if scale == 0.0 {
        return Err(CoreError::invalid("scale", "cannot invert a zero scale"));
    }
    let raw = (value - record.get_f64("offset")?) / scale;
    ops.write_raw(record, raw)?;
    record.store_field("raw_value", raw)?;
    record.store_field("value", value)?;
    Ok(())
}

/// Read back the output value.
pub fn read(record: &mut Record) -> CoreResult<f64> {
    let raw = match ops(record)?.read_raw(record) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::UnsupportedOperation => {
            return record.get_f64("value");
        }
        Err(err) => return Err(err),
    };
    let value = raw * record.get_f64("scale")? + record.get_f64("offset")?;
    record.store_field("raw_value", raw)?;
    record.store_field("value", value)?;
    Ok(value)
}
