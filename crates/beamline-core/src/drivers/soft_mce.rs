//! Software MCE backed by a monitor thread.
//!
//! While acquiring, the monitor thread appends one reading per poll (`index * step`) until
//! `maximum_num_values` readings have accumulated, then returns to idle. Client calls only
//! post commands; `read` copies the readings into the class block's `value_array`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::class::MceOps;
use crate::driver::{ClassOps, Driver, RecordClass, RecordConfig, RecordLifecycle};
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldFlags, FieldType, SchemaBuilder, StructKind};
use crate::monitor::{
    MonitorCommand, MonitorConfig, MonitorHandler, MonitorStatus, MonitorThread, PollOutcome,
};
use crate::record::Record;

/// Runtime state attached to an open `soft_mce` record.
pub struct SoftMceRuntime {
    pub monitor: MonitorThread,
    readings: Arc<Mutex<Vec<f64>>>,
}

impl SoftMceRuntime {
    /// Readings collected by the monitor thread so far.
    pub fn readings(&self) -> Vec<f64> {
        self.readings.lock().clone()
    }
}

struct Acquisition {
    readings: Arc<Mutex<Vec<f64>>>,
    maximum: usize,
    step: f64,
}

impl MonitorHandler for Acquisition {
    fn start(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn clear(&mut self) -> CoreResult<()> {
        self.readings.lock().clear();
        Ok(())
    }

    fn poll(&mut self) -> CoreResult<PollOutcome> {
        let mut readings = self.readings.lock();
        if readings.len() >= self.maximum {
            return Ok(PollOutcome::Finished);
        }
        let next = readings.len() as f64 * self.step;
        readings.push(next);
        Ok(PollOutcome::Continue)
    }
}

struct SoftMceLifecycle {
    monitor: MonitorConfig,
}

fn maximum(record: &Record) -> CoreResult<usize> {
    usize::try_from(record.get_i64("maximum_num_values")?)
        .map_err(|_| CoreError::invalid("maximum_num_values", "negative maximum"))
}

impl RecordLifecycle for SoftMceLifecycle {
    fn create(&self, record: &mut Record, config: &RecordConfig) -> CoreResult<()> {
        record.parse_description(config.tokens())?;
        let maximum = maximum(record)?;
        record.reserve_varargs("value_array", maximum)
    }

    fn open(&self, record: &mut Record) -> CoreResult<()> {
        let readings = Arc::new(Mutex::new(Vec::new()));
        let handler = Acquisition {
            readings: Arc::clone(&readings),
            maximum: maximum(record)?,
            step: record.get_f64("step")?,
        };
        let config = self
            .monitor
            .with_thread_name(format!("mce-{}", record.name()));
        let monitor = MonitorThread::spawn(handler, &config)?;
        record.set_runtime(SoftMceRuntime { monitor, readings });
        Ok(())
    }

    fn close(&self, record: &mut Record) -> CoreResult<()> {
        match record.take_runtime::<SoftMceRuntime>() {
            Some(mut runtime) => runtime.monitor.shutdown(),
            None => Ok(()),
        }
    }
}

struct SoftMce;

fn runtime(record: &Record) -> CoreResult<&SoftMceRuntime> {
    record.runtime::<SoftMceRuntime>().ok_or_else(|| {
        CoreError::CorruptState(format!("MCE '{}' is not open", record.name()))
    })
}

impl MceOps for SoftMce {
    fn start(&self, record: &mut Record) -> CoreResult<()> {
        runtime(record)?.monitor.request(MonitorCommand::Start)
    }

    fn stop(&self, record: &mut Record) -> CoreResult<()> {
        runtime(record)?.monitor.request(MonitorCommand::Stop)
    }

    fn clear(&self, record: &mut Record) -> CoreResult<()> {
        runtime(record)?.monitor.request(MonitorCommand::Clear)
    }

    fn status(&self, record: &Record) -> CoreResult<MonitorStatus> {
        Ok(runtime(record)?.monitor.status())
    }

    fn read(&self, record: &mut Record) -> CoreResult<Vec<f64>> {
        Ok(runtime(record)?.readings())
    }
}

pub(super) fn driver(monitor: MonitorConfig) -> CoreResult<Driver> {
    let schema = SchemaBuilder::new(StructKind::Type)
        .scalar("step", FieldType::Double, FieldFlags::IN_DESCRIPTION)
        .build()?;
    Driver::builder("soft_mce", RecordClass::Mce)
        .lifecycle(SoftMceLifecycle { monitor })
        .class_ops(ClassOps::Mce(Arc::new(SoftMce)))
        .type_schema(schema)
        .build()
}
