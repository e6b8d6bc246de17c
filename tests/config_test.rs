//! Configuration loading from files and environment overrides.
//!
//! Tests that load configuration are serialized because the environment is process-wide.

use std::io::Write;
use std::path::PathBuf;

use beamline::config::{BeamlineConfig, LogFormat};
use serial_test::serial;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = BeamlineConfig::load_from(dir.path().join("absent.toml"))?;
    assert_eq!(config, BeamlineConfig::default());
    Ok(())
}

#[test]
#[serial]
fn test_file_sections_override_defaults() -> anyhow::Result<()> {
    let file = write_config(
        r#"
[logging]
level = "debug"
format = "json"

[monitor]
poll_interval_ms = 5

[modules]
search_paths = ["/opt/beamline/modules"]
discover = false

[database]
records = ["theta soft_motor 0 1 -5 5 deg"]
"#,
    )?;

    let config = BeamlineConfig::load_from(file.path())?;
    config.validate()?;

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    // Keys left out of a section keep their defaults.
    assert!(config.logging.thread_names);
    assert_eq!(config.monitor.poll_interval_ms, 5);
    assert_eq!(config.monitor.startup_timeout_ms, 2000);
    assert_eq!(
        config.modules.search_paths,
        vec![PathBuf::from("/opt/beamline/modules")]
    );
    assert!(!config.modules.discover);
    assert_eq!(config.database.records.len(), 1);
    Ok(())
}

#[test]
#[serial]
fn test_environment_overrides_file() -> anyhow::Result<()> {
    let file = write_config("[logging]\nlevel = \"warn\"\n")?;

    std::env::set_var("BEAMLINE_LOGGING__LEVEL", "trace");
    std::env::set_var("BEAMLINE_MONITOR__POLL_INTERVAL_MS", "25");
    let result = BeamlineConfig::load_from(file.path());
    std::env::remove_var("BEAMLINE_LOGGING__LEVEL");
    std::env::remove_var("BEAMLINE_MONITOR__POLL_INTERVAL_MS");

    let config = result?;
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.monitor.poll_interval_ms, 25);
    Ok(())
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() -> anyhow::Result<()> {
    let file = write_config("[monitor]\npoll_interval_ms = \"often\"\n")?;
    assert!(BeamlineConfig::load_from(file.path()).is_err());
    Ok(())
}

#[test]
#[serial]
fn test_loaded_values_are_validated_separately() -> anyhow::Result<()> {
    let file = write_config("[logging]\nlevel = \"chatty\"\n")?;
    let config = BeamlineConfig::load_from(file.path())?;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("chatty"));
    Ok(())
}

#[test]
fn test_template_round_trips_through_loader() -> anyhow::Result<()> {
    let mut config = BeamlineConfig::default();
    config.logging.format = LogFormat::Compact;
    config.database.files = vec![PathBuf::from("db/motors.db")];
    let text = config.to_toml()?;
    let parsed: BeamlineConfig = toml::from_str(&text)?;
    assert_eq!(parsed, config);
    Ok(())
}
