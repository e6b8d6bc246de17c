//! Motor class.

use std::sync::Arc;

use tracing::debug;

use crate::driver::ClassOps;
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldFlags, FieldSchema, FieldType, SchemaBuilder, StructKind};
use crate::record::Record;

/// Standard motor class block.
pub fn schema() -> CoreResult<FieldSchema> {
    let described = FieldFlags::IN_DESCRIPTION;
    SchemaBuilder::new(StructKind::Class)
        .scalar(
            "position",
            FieldType::Double,
            described | FieldFlags::IN_SUMMARY | FieldFlags::READ_ONLY,
        )
        .scalar("destination", FieldType::Double, FieldFlags::READ_ONLY)
        .scalar("speed", FieldType::Double, described)
        .scalar("negative_limit", FieldType::Double, described)
        .scalar("positive_limit", FieldType::Double, described)
        .scalar("busy", FieldType::Bool, FieldFlags::READ_ONLY | FieldFlags::IN_SUMMARY)
        .string("units", 16, described | FieldFlags::IN_SUMMARY)
        .build()
}

/// Motor verbs. Every slot is optional.
pub trait MotorOps: Send + Sync {
    fn move_absolute(&self, record: &mut Record, _destination: f64) -> CoreResult<()> {
        Err(record.unsupported("move_absolute"))
    }

    fn get_position(&self, record: &mut Record) -> CoreResult<f64> {
        Err(record.unsupported("get_position"))
    }

    fn soft_abort(&self, record: &mut Record) -> CoreResult<()> {
        Err(record.unsupported("soft_abort"))
    }

    fn home(&self, record: &mut Record, _direction: i32) -> CoreResult<()> {
        Err(record.unsupported("home"))
    }
}

fn ops(record: &Record) -> CoreResult<Arc<dyn MotorOps>> {
    match record.driver().class_ops() {
        ClassOps::Motor(ops) => Ok(Arc::clone(ops)),
        other => Err(CoreError::CorruptState(format!(
            "record '{}' has a {} table, not a motor table",
            record.name(),
            other.class()
        ))),
    }
}

/// Move to `destination` after checking the soft limits.
///
/// Limits are enforced only when `negative_limit < positive_limit`.
pub fn move_absolute(record: &mut Record, destination: f64) -> CoreResult<()> {
    let ops = ops(record)?;
    let low = record.get_f64("negative_limit")?;
    let high = record.get_f64("positive_limit")?;
    if !destination.is_finite() || (low < high && !(low..=high).contains(&destination)) {
        return Err(CoreError::invalid(
            "destination",
            format!("{} is outside the soft limits [{}, {}]", destination, low, high),
        ));
    }
    record.store_field("destination", destination)?;
    ops.move_absolute(record, destination)?;
    debug!(record = %record.name(), destination, "Motor move commanded");
    Ok(())
}

/// Read the position from the driver and store it in the class block.
pub fn get_position(record: &mut Record) -> CoreResult<f64> {
    let position = ops(record)?.get_position(record)?;
    record.store_field("position", position)?;
    Ok(position)
}

/// Stop motion as soon as possible.
pub fn soft_abort(record: &mut Record) -> CoreResult<()> {
    ops(record)?.soft_abort(record)
}

/// Search for home in `direction`.
pub fn home(record: &mut Record, direction: i32) -> CoreResult<()> {
    ops(record)?.home(record, direction)
}
