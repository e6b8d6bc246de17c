//! Multichannel encoder / scaler (MCE) class.
//!
//! An MCE accumulates an array of readings in the background. The class block carries the
//! readings as a varargs `value_array` whose length is `current_num_values`; drivers reserve
//! `maximum_num_values` elements of capacity when the record is created.

use std::sync::Arc;

use tracing::debug;

use crate::driver::ClassOps;
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldFlags, FieldSchema, FieldType, SchemaBuilder, StructKind};
use crate::monitor::MonitorStatus;
use crate::record::Record;

/// Standard MCE class block.
pub fn schema() -> CoreResult<FieldSchema> {
    SchemaBuilder::new(StructKind::Class)
        .scalar(
            "maximum_num_values",
            FieldType::UInt32,
            FieldFlags::IN_DESCRIPTION | FieldFlags::READ_ONLY,
        )
        .scalar(
            "current_num_values",
            FieldType::UInt32,
            FieldFlags::READ_ONLY | FieldFlags::IN_SUMMARY,
        )
        .varargs(
            "value_array",
            FieldType::Double,
            "current_num_values",
            FieldFlags::READ_ONLY,
        )
        .scalar(
            "status",
            FieldType::UInt8,
            FieldFlags::READ_ONLY | FieldFlags::IN_SUMMARY,
        )
        .build()
}

/// Multichannel encoder verbs. Every verb defaults to `UnsupportedOperation`.
pub trait MceOps: Send + Sync {
    fn start(&self, record: &mut Record) -> CoreResult<()> {
        Err(record.unsupported("start"))
    }

    fn stop(&self, record: &mut Record) -> CoreResult<()> {
        Err(record.unsupported("stop"))
    }

    fn clear(&self, record: &mut Record) -> CoreResult<()> {
        Err(record.unsupported("clear"))
    }

    /// Current acquisition status. Must not block on the device.
    fn status(&self, record: &Record) -> CoreResult<MonitorStatus> {
        Err(record.unsupported("status"))
    }

    /// Readings accumulated so far.
    fn read(&self, record: &mut Record) -> CoreResult<Vec<f64>> {
        Err(record.unsupported("read"))
    }
}

fn ops(record: &Record) -> CoreResult<Arc<dyn MceOps>> {
    match record.driver().class_ops() {
        ClassOps::Mce(ops) => Ok(Arc::clone(ops)),
        other => Err(CoreError::CorruptState(format!(
            "record '{}' has a {} table, not an MCE table",
            record.name(),
            other.class()
        ))),
    }
}

/// Start acquisition.
pub fn start(record: &mut Record) -> CoreResult<()> {
    ops(record)?.start(record)?;
    debug!(record = %record.name(), "MCE start requested");
    Ok(())
}

/// Stop acquisition.
pub fn stop(record: &mut Record) -> CoreResult<()> {
    ops(record)?.stop(record)?;
    debug!(record = %record.name(), "MCE stop requested");
    Ok(())
}

/// Clear accumulated readings.
pub fn clear(record: &mut Record) -> CoreResult<()> {
    ops(record)?.clear(record)
}

/// Query the status and mirror it into the `status` field.
pub fn status(record: &mut Record) -> CoreResult<MonitorStatus> {
    let status = ops(record)?.status(record)?;
    record.store_field("status", status.as_u8())?;
    Ok(status)
}

/// Fetch the readings into `value_array` and return them.
///
/// More readings than `maximum_num_values` are truncated to it.
pub fn read(record: &mut Record) -> CoreResult<Vec<f64>> {
    let mut values = ops(record)?.read(record)?;
    let maximum = usize::try_from(record.get_i64("maximum_num_values")?)
        .map_err(|_| CoreError::invalid("maximum_num_values", "negative maximum"))?;
    values.truncate(maximum);
    record.store_field("value_array", values.clone())?;
    Ok(values)
}
