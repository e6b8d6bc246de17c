//! Bootstrapping frameworks from configuration.

use std::path::PathBuf;
use std::time::Duration;

use beamline::prelude::*;
use beamline_plugin_api::PluginLoadError;
use serial_test::serial;

fn quiet_config() -> BeamlineConfig {
    let mut config = BeamlineConfig::default();
    config.modules.discover = false;
    config
}

#[test]
#[serial]
fn test_builtin_drivers_and_inline_records() -> anyhow::Result<()> {
    let mut config = quiet_config();
    config.monitor.poll_interval_ms = 3;
    config.database.records = vec![
        "theta soft_motor 0 1 -10 10 deg".to_string(),
        "diode soft_ainput 2.0 0.5 V 1.0".to_string(),
    ];

    let framework = bootstrap(&config)?;
    assert_eq!(
        framework.monitor_config().poll_interval,
        Duration::from_millis(3)
    );
    assert!(framework.driver_names().contains(&"soft_mce".to_string()));
    assert_eq!(framework.record_names(), vec!["theta", "diode"]);

    let diode = framework.find_record("diode")?;
    assert_eq!(ainput::read(&mut diode.lock())?, 2.5);
    framework.shutdown()?;
    Ok(())
}

#[test]
#[serial]
fn test_database_files_load_before_inline_records() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let motors = dir.path().join("motors.db");
    std::fs::write(
        &motors,
        "# motors\nx soft_motor 0 1 -1 1 mm\nsrc soft_ainput 1 0 V 4.0\n",
    )?;

    let mut config = quiet_config();
    config.database.files = vec![motors];
    config.database.records = vec!["follower soft_linked_ainput 2 0 V src".to_string()];

    let framework = bootstrap(&config)?;
    assert_eq!(framework.record_names(), vec!["x", "src", "follower"]);
    let follower = framework.find_record("follower")?;
    assert_eq!(ainput::read(&mut follower.lock())?, 8.0);
    Ok(())
}

#[test]
#[serial]
fn test_missing_database_file_is_io_error() {
    let mut config = quiet_config();
    config.database.files = vec![PathBuf::from("/nonexistent/beamline.db")];

    match bootstrap(&config) {
        Err(BeamlineError::Io { path, .. }) => {
            assert_eq!(path, PathBuf::from("/nonexistent/beamline.db"));
        }
        other => panic!("expected an I/O error, got {:?}", other.map(|f| f.id())),
    }
}

#[test]
#[serial]
fn test_explicit_library_must_load() {
    let mut config = quiet_config();
    config.modules.libraries = vec![PathBuf::from("/nonexistent/libmissing.so")];

    let err = bootstrap(&config).unwrap_err();
    assert!(matches!(
        err,
        BeamlineError::Plugin(PluginLoadError::LoadFailed { .. })
    ));
}

#[test]
#[serial]
fn test_discovery_in_empty_directory() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = BeamlineConfig::default();
    config.modules.search_paths = vec![dir.path().to_path_buf()];

    let framework = bootstrap(&config)?;
    assert!(framework.modules().is_empty());
    Ok(())
}

#[test]
#[serial]
fn test_bad_record_line_aborts_bootstrap() {
    let mut config = quiet_config();
    config.database.records = vec![
        "ok soft_motor 0 1 -1 1 mm".to_string(),
        "broken no_such_driver 1 2 3".to_string(),
    ];

    let err = bootstrap(&config).unwrap_err();
    match err {
        BeamlineError::Core(core) => assert_eq!(core.kind(), ErrorKind::UnknownType),
        other => panic!("expected a core error, got {}", other),
    }
}

#[test]
#[serial]
fn test_bootstrap_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("beamline.toml");
    std::fs::write(
        &path,
        "[logging]\nformat = \"compact\"\nansi = false\n\n[modules]\ndiscover = false\n\n\
         [database]\nrecords = [\"gain soft_double 2 1.5 2.5\"]\n",
    )?;

    let framework = bootstrap_from_file(&path)?;
    let gain = framework.find_record("gain")?;
    assert_eq!(gain.lock().length_of("value")?, 2);
    Ok(())
}
