//! Software analog channels.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::class::{self, AnalogInputOps, AnalogOutputOps};
use crate::driver::{ClassOps, Driver, RecordClass, RecordLifecycle, RecordLookup};
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldFlags, FieldType, SchemaBuilder, StructKind};
use crate::record::Record;

/// Input whose raw reading is the `raw_setpoint` field.
struct SoftInput;

impl AnalogInputOps for SoftInput {
    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        record.get_f64("raw_setpoint")
    }
}

pub(super) fn input_driver() -> CoreResult<Driver> {
    let schema = SchemaBuilder::new(StructKind::Type)
        .scalar("raw_setpoint", FieldType::Double, FieldFlags::IN_DESCRIPTION)
        .build()?;
    Driver::builder("soft_ainput", RecordClass::AnalogInput)
        .class_ops(ClassOps::AnalogInput(Arc::new(SoftInput)))
        .type_schema(schema)
        .build()
}

/// Output that accepts any value and reads back what was written.
struct SoftOutput;

impl AnalogOutputOps for SoftOutput {
    fn write_raw(&self, _record: &mut Record, _raw: f64) -> CoreResult<()> {
        Ok(())
    }

    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        record.get_f64("raw_value")
    }
}

pub(super) fn output_driver() -> CoreResult<Driver> {
    Driver::builder("soft_aoutput", RecordClass::AnalogOutput)
        .class_ops(ClassOps::AnalogOutput(Arc::new(SoftOutput)))
        .build()
}

const LINKED_TYPE: &str = "soft_linked_ainput";

/// Runtime state of a linked input: the resolved source record.
struct LinkedSource(Weak<Mutex<Record>>);

/// Input that reads the `value` of another analog record named by its `source` field.
struct LinkedLifecycle;

impl RecordLifecycle for LinkedLifecycle {
    fn finish_init(&self, record: &mut Record, lookup: &dyn RecordLookup) -> CoreResult<()> {
        let source = record.get_string("source")?;
        if source.is_empty() || source == record.name() {
            return Err(CoreError::invalid(
                "source",
                format!("'{}' cannot be used as its own source", record.name()),
            ));
        }
        match lookup.class_of(&source) {
            Some(RecordClass::AnalogInput | RecordClass::AnalogOutput) => {}
            Some(other) => {
                return Err(CoreError::invalid(
                    "source",
                    format!("record '{}' is a {}, not an analog channel", source, other),
                ))
            }
            None => {
                return Err(CoreError::invalid(
                    "source",
                    format!("record '{}' does not exist", source),
                ))
            }
        }
        let handle = lookup
            .find(&source)
            .ok_or_else(|| CoreError::invalid("source", format!("record '{}' vanished", source)))?;
        // Chains could lock each other while updating.
        if handle.lock().type_name() == LINKED_TYPE {
            return Err(CoreError::invalid(
                "source",
                format!("record '{}' is itself a linked input", source),
            ));
        }
        record.set_runtime(LinkedSource(Arc::downgrade(&handle)));
        debug!(record = %record.name(), source = %source, "Linked input resolved");
        Ok(())
    }
}

struct LinkedInput;

impl AnalogInputOps for LinkedInput {
    fn read_raw(&self, record: &mut Record) -> CoreResult<f64> {
        let source = record
            .runtime::<LinkedSource>()
            .and_then(|link| link.0.upgrade())
            .ok_or_else(|| {
                CoreError::CorruptState(format!(
                    "source of linked input '{}' is not available",
                    record.name()
                ))
            })?;
        let mut source = source.lock();
        class::update(&mut source)?;
        source.get_f64("value")
    }
}

pub(super) fn linked_input_driver() -> CoreResult<Driver> {
    let schema = SchemaBuilder::new(StructKind::Type)
        .record_ref("source", FieldFlags::IN_DESCRIPTION | FieldFlags::IN_SUMMARY)
        .build()?;
    Driver::builder(LINKED_TYPE, RecordClass::AnalogInput)
        .lifecycle(LinkedLifecycle)
        .class_ops(ClassOps::AnalogInput(Arc::new(LinkedInput)))
        .type_schema(schema)
        .build()
}
