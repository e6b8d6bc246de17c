//! Class-generic algorithms dispatching through driver operation tables.

use std::sync::Arc;
use std::time::Duration;

use beamline_core::drivers::SoftMceRuntime;
use beamline_core::prelude::*;
use beamline_core::MonitorStatus;

fn framework() -> anyhow::Result<Framework> {
    Ok(Framework::with_builtin_drivers(MonitorConfig::default())?)
}

#[test]
fn test_motor_move_respects_soft_limits() -> anyhow::Result<()> {
    let framework = framework()?;
    let theta = framework.create_record_from_line("theta soft_motor 0 1 -10 10 deg")?;
    let mut theta = theta.lock();

    motor::move_absolute(&mut theta, 4.0)?;
    assert_eq!(motor::get_position(&mut theta)?, 4.0);
    assert_eq!(theta.get_f64("destination")?, 4.0);
    assert_eq!(theta.get_i64("move_count")?, 1);

    let err = motor::move_absolute(&mut theta, 11.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert_eq!(theta.get_f64("position")?, 4.0);
    assert_eq!(theta.get_i64("move_count")?, 1);
    Ok(())
}

#[test]
fn test_motor_without_limits_moves_anywhere() -> anyhow::Result<()> {
    let framework = framework()?;
    let x = framework.create_record_from_line("x soft_motor 0 1 0 0 mm")?;
    motor::move_absolute(&mut x.lock(), -1.0e6)?;
    assert_eq!(x.lock().get_f64("position")?, -1.0e6);

    let err = motor::move_absolute(&mut x.lock(), f64::NAN).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    Ok(())
}

#[test]
fn test_missing_slot_is_unsupported_not_a_crash() -> anyhow::Result<()> {
    let framework = framework()?;
    let x = framework.create_record_from_line("x soft_motor 0 1 0 0 mm")?;
    let err = motor::home(&mut x.lock(), 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(err.to_string().contains("home"));
    Ok(())
}

struct EmptyMotor;
impl MotorOps for EmptyMotor {}

struct EmptyInput;
impl AnalogInputOps for EmptyInput {}

#[test]
fn test_empty_tables_answer_every_verb() -> anyhow::Result<()> {
    let framework = Framework::default();
    framework.register_driver(
        Driver::builder("bare_motor", RecordClass::Motor)
            .class_ops(ClassOps::Motor(Arc::new(EmptyMotor)))
            .build()?,
    )?;
    framework.register_driver(
        Driver::builder("bare_input", RecordClass::AnalogInput)
            .class_ops(ClassOps::AnalogInput(Arc::new(EmptyInput)))
            .build()?,
    )?;
    framework.load_database("m bare_motor 0 1 0 0 mm\ni bare_input 1 0 V\n")?;

    let m = framework.find_record("m")?;
    let mut m = m.lock();
    for result in [
        motor::move_absolute(&mut m, 1.0),
        motor::soft_abort(&mut m),
        motor::home(&mut m, -1),
        motor::get_position(&mut m).map(drop),
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    }
    drop(m);

    let i = framework.find_record("i")?;
    let err = ainput::read(&mut i.lock()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);

    // Unsupported verbs are skipped by the bulk update.
    assert!(framework.update_all().is_empty());
    Ok(())
}

#[test]
fn test_class_algorithm_on_wrong_class_is_rejected() -> anyhow::Result<()> {
    let framework = framework()?;
    let ai = framework.create_record_from_line("ai soft_ainput 1 0 V 2")?;
    let err = motor::move_absolute(&mut ai.lock(), 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptState);
    Ok(())
}

#[test]
fn test_analog_output_write_and_read_back() -> anyhow::Result<()> {
    let framework = framework()?;
    let ao = framework.create_record_from_line("ao soft_aoutput 2.0 1.0 V")?;
    let mut ao = ao.lock();

    aoutput::write(&mut ao, 5.0)?;
    assert_eq!(ao.get_f64("raw_value")?, 2.0);
    assert_eq!(aoutput::read(&mut ao)?, 5.0);

    ao.set_field("scale", 0.0)?;
    let err = aoutput::write(&mut ao, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    Ok(())
}

#[test]
fn test_update_all_refreshes_class_blocks() -> anyhow::Result<()> {
    let framework = framework()?;
    framework.load_database(
        "ai soft_ainput 10 1 mV 0.25\n\
         m soft_motor 0 1 0 0 mm\n\
         v soft_double 1 7.0\n",
    )?;
    assert!(framework.update_all().is_empty());
    assert_eq!(framework.find_record("ai")?.lock().get_f64("value")?, 3.5);
    Ok(())
}

#[test]
fn test_mce_acquires_into_value_array() -> anyhow::Result<()> {
    let framework = framework()?;
    let acq = framework.create_record_from_line("acq soft_mce 5 0.5")?;
    let mut acq = acq.lock();

    assert_eq!(mce::status(&mut acq)?, MonitorStatus::Idle);
    mce::start(&mut acq)?;
    let runtime = acq
        .runtime::<SoftMceRuntime>()
        .ok_or_else(|| anyhow::anyhow!("soft_mce record has no runtime"))?;
    runtime.monitor.settle(Duration::from_secs(5))?;

    // Five readings, then the handler reports completion and the thread goes idle.
    assert!(runtime
        .monitor
        .probe()
        .wait_for(MonitorStatus::Idle, Duration::from_secs(5)));
    let values = mce::read(&mut acq)?;
    assert_eq!(values, [0.0, 0.5, 1.0, 1.5, 2.0]);
    assert_eq!(acq.length_of("value_array")?, 5);
    assert_eq!(acq.get_i64("current_num_values")?, 5);

    mce::clear(&mut acq)?;
    if let Some(runtime) = acq.runtime::<SoftMceRuntime>() {
        runtime.monitor.settle(Duration::from_secs(5))?;
    }
    assert!(mce::read(&mut acq)?.is_empty());
    assert_eq!(acq.length_of("value_array")?, 0);
    Ok(())
}

#[test]
fn test_mce_status_is_mirrored_into_field() -> anyhow::Result<()> {
    let framework = framework()?;
    let acq = framework.create_record_from_line("acq soft_mce 3 1.0")?;
    let mut acq = acq.lock();
    let status = mce::status(&mut acq)?;
    assert_eq!(acq.get_i64("status")?, i64::from(status.as_u8()));
    Ok(())
}
