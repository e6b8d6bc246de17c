//! Generic field access on live records.

use beamline_core::field::{FieldBlock, SchemaBuilder};
use beamline_core::prelude::*;

fn framework() -> anyhow::Result<Framework> {
    Ok(Framework::with_builtin_drivers(MonitorConfig::default())?)
}

#[test]
fn test_varargs_length_follows_writes() -> anyhow::Result<()> {
    let framework = framework()?;
    let buffer = framework.create_record_from_line("buffer soft_double 3 1.0 2.0 3.0")?;
    let mut buffer = buffer.lock();

    assert_eq!(buffer.capacity_of("value")?, 3);
    assert_eq!(buffer.length_of("value")?, 3);
    assert_eq!(buffer.get_element("value", &[2])?, FieldValue::Double(3.0));

    buffer.set_field("value", vec![4.0, 5.0])?;
    assert_eq!(buffer.get_i64("num_elements")?, 2);
    assert_eq!(
        buffer.get_field("value")?,
        FieldValue::Array(vec![FieldValue::Double(4.0), FieldValue::Double(5.0)])
    );

    let err = buffer.get_element("value", &[2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);

    // Growing past the reserved storage fails and leaves the field untouched.
    let err = buffer.set_field("value", vec![1.0, 2.0, 3.0, 4.0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(buffer.length_of("value")?, 2);

    let err = buffer.set_field("num_elements", 9u32).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);

    buffer.reserve_varargs("value", 9)?;
    buffer.set_field("num_elements", 9u32)?;
    assert_eq!(buffer.length_of("value")?, 9);
    assert_eq!(buffer.get_element("value", &[1])?, FieldValue::Double(5.0));
    Ok(())
}

#[test]
fn test_read_only_fields_reject_generic_writes() -> anyhow::Result<()> {
    let framework = framework()?;
    let theta = framework.create_record_from_line("theta soft_motor 1.5 1 0 0 deg")?;
    let mut theta = theta.lock();

    let err = theta.set_field("position", 3.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FieldReadOnly);
    assert_eq!(theta.get_f64("position")?, 1.5);

    theta.store_field("position", 3.0)?;
    assert_eq!(theta.get_f64("position")?, 3.0);

    let err = theta.get_field("no_such_field").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FieldNotFound);
    Ok(())
}

#[test]
fn test_text_access_parses_by_field_type() -> anyhow::Result<()> {
    let framework = framework()?;
    let theta = framework.create_record_from_line("theta soft_motor 0 1 0 0 deg")?;
    let mut theta = theta.lock();

    theta.set_field_text("speed", "2.25")?;
    assert_eq!(theta.get_f64("speed")?, 2.25);
    assert_eq!(theta.get_field_text("speed")?, "2.25");

    theta.set_field_text("units", "mrad")?;
    assert_eq!(theta.get_string("units")?, "mrad");

    let err = theta.set_field_text("speed", "quick").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    let err = theta
        .set_field_text("units", "a name far longer than sixteen bytes")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
    assert_eq!(theta.get_string("units")?, "mrad");
    Ok(())
}

#[test]
fn test_description_recreates_record() -> anyhow::Result<()> {
    let framework = framework()?;
    framework.load_database(
        "theta soft_motor 0.5 2 -1 1 \"milli deg\"\nbuffer soft_double 2 0.25 0.75\n",
    )?;

    let copy = Framework::with_builtin_drivers(MonitorConfig::default())?;
    for name in framework.record_names() {
        let line = framework.find_record(&name)?.lock().description()?;
        copy.create_record_from_line(&line)?;
        let original = framework.find_record(&name)?.lock().to_json()?;
        let recreated = copy.find_record(&name)?.lock().to_json()?;
        assert_eq!(original, recreated, "record {name}");
    }
    Ok(())
}

#[test]
fn test_summary_and_dump() -> anyhow::Result<()> {
    let framework = framework()?;
    let theta = framework.create_record_from_line("theta soft_motor 0.5 2 -1 1 deg")?;
    let theta = theta.lock();

    let summary = theta.summary()?;
    assert!(summary.starts_with("theta soft_motor"));
    assert!(summary.contains("deg"));
    assert!(!summary.contains("speed"));

    let dump = theta.dump()?;
    assert!(dump.lines().count() > 7);
    assert!(dump.contains("negative_limit"));
    assert!(dump.contains("move_count"));

    let json = theta.to_json()?;
    assert_eq!(json["class"], "motor");
    assert_eq!(json["fields"]["speed"], 2.0);
    Ok(())
}

#[test]
fn test_standalone_block_layout() -> anyhow::Result<()> {
    let schema = SchemaBuilder::new(StructKind::Type)
        .scalar("channels", FieldType::UInt16, FieldFlags::IN_DESCRIPTION)
        .array("gains", FieldType::Float, &[2, 2], FieldFlags::IN_DESCRIPTION)
        .varargs("samples", FieldType::Int32, "channels", FieldFlags::empty())
        .build()?;
    let mut block = FieldBlock::allocate(std::sync::Arc::new(schema))?;

    block.set("gains", vec![vec![1.0f32, 2.0], vec![3.0, 4.0]])?;
    assert_eq!(block.get_element("gains", &[1, 0])?, FieldValue::Float(3.0));

    block.reserve_varargs("samples", 4)?;
    block.set("samples", vec![7i32, -7, 70])?;
    assert_eq!(block.get_i64("channels")?, 3);
    assert_eq!(block.get_element("samples", &[1])?, FieldValue::Int32(-7));
    Ok(())
}
