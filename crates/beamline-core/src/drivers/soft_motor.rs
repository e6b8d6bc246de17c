use std::sync::Arc;

use crate::class::MotorOps;
use crate::driver::{ClassOps, Driver, RecordClass};
use crate::error::CoreResult;
use crate::field::{FieldFlags, FieldType, SchemaBuilder, StructKind};
use crate::record::Record;

/// Motor that arrives instantly. Homing is not supported.
struct SoftMotor;

impl MotorOps for SoftMotor {
    fn move_absolute(&self, record: &mut Record, destination: f64) -> CoreResult<()> {
        record.store_field("position", destination)?;
        let moves = record.get_i64("move_count")?;
        record.store_field("move_count", moves + 1)
    }

    fn get_position(&self, record: &mut Record) -> CoreResult<f64> {
        record.get_f64("position")
    }

    fn soft_abort(&self, record: &mut Record) -> CoreResult<()> {
        let position = record.get_f64("position")?;
        record.store_field("destination", position)
    }
}

pub(super) fn driver() -> CoreResult<Driver> {
    let schema = SchemaBuilder::new(StructKind::Type)
        .scalar(
            "move_count",
            FieldType::UInt32,
            FieldFlags::READ_ONLY | FieldFlags::IN_SUMMARY,
        )
        .build()?;
    Driver::builder("soft_motor", RecordClass::Motor)
        .class_ops(ClassOps::Motor(Arc::new(SoftMotor)))
        .type_schema(schema)
        .build()
}
