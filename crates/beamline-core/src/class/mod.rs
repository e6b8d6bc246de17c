//! Record classes: standard class schemas, class-specific dispatch tables, and the
//! class-generic algorithms that call through them.
//!
//! Each class module exposes a `schema()` used as the class block layout of every driver of
//! that class, an `*Ops` trait whose slots default to `UnsupportedOperation`, and free
//! functions such as [`motor::move_absolute`] that operate on any record of the class.

pub mod ainput;
pub mod aoutput;
pub mod mce;
pub mod motor;

pub use ainput::AnalogInputOps;
pub use aoutput::AnalogOutputOps;
pub use mce::MceOps;
pub use motor::MotorOps;

use crate::driver::RecordClass;
use crate::error::{CoreResult, ErrorKind};
use crate::record::Record;

/// Refresh the class block of `record` from its device.
///
/// Motors read their position, analog channels their value and MCEs their status. Verbs a
/// driver does not support are skipped.
pub fn update(record: &mut Record) -> CoreResult<()> {
    let result = match record.class() {
        RecordClass::Motor => motor::get_position(record).map(drop),
        RecordClass::AnalogInput => ainput::read(record).map(drop),
        RecordClass::AnalogOutput => aoutput::read(record).map(drop),
        RecordClass::Mce => mce::status(record).map(drop),
        RecordClass::Variable => Ok(()),
    };
    match result {
        Err(err) if err.kind() == ErrorKind::UnsupportedOperation => Ok(()),
        other => other,
    }
}
