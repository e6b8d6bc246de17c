//! Analog input class: a scaled reading `value = raw_value * scale + offset`.

use std::sync::Arc;

use crate::driver::ClassOps;
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldFlags, FieldSchema, FieldType, SchemaBuilder, StructKind};
use crate::record::Record;

/// Standard analog input class block.
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

/// Analog input verbs. Every verb defaults to `UnsupportedOperation`.
pub trait AnalogInputOps: Send + Sync {
    /// Acquire one raw reading.
    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        Err(record.unsupported("read_raw"))
    }
}

fn ops(record: &Record) -> CoreResult<Arc<dyn AnalogInputOps>> {
    match record.driver().class_ops() {
        ClassOps::AnalogInput(ops) => Ok(Arc::clone(ops)),
        other => Err(CoreError::CorruptState(format!(
            "record '{}' has a {} table, not an analog input table",
            record.name(),
            other.class()
        ))),
    }
}

/// Read the channel, store the raw and scaled values, and return the scaled value.
pub fn read(record: &mut Record) -> CoreResult<f64> {
    let raw = ops(record)?.read_raw(record)?;
    let value = raw * record.get_f64("scale")? + record.get_f64("offset")?;
    record.store_field("raw_value", raw)?;
    record.store_field("value", value)?;
    Ok(value)
}
