//! All-or-nothing installation of module manifests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use beamline_core::prelude::*;
use beamline_core::{Module, ModuleOrigin, Namespace};

fn variable_driver(name: &str) -> anyhow::Result<Driver> {
    Ok(Driver::builder(name, RecordClass::Variable).build()?)
}

fn origin() -> ModuleOrigin {
    ModuleOrigin::Static("module_install_test".into())
}

struct Upper {
    finalized: Arc<AtomicUsize>,
}

impl Extension for Upper {
    fn name(&self) -> &str {
        "upper"
    }

    fn finalize(&mut self) -> CoreResult<()> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn call_string(&mut self, text: &str) -> CoreResult<String> {
        Ok(text.to_uppercase())
    }
}

struct Broken;

impl Extension for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn initialize(&mut self) -> CoreResult<()> {
        Err(CoreError::Config("no interpreter available".into()))
    }
}

#[test]
fn test_install_registers_drivers_and_extensions() -> anyhow::Result<()> {
    let framework = Framework::default();
    let finalized = Arc::new(AtomicUsize::new(0));
    let manifest = ModuleManifest::new("tools", origin())
        .with_driver(variable_driver("tool_a")?)
        .with_driver(variable_driver("tool_b")?)
        .with_extension(Box::new(Upper {
            finalized: Arc::clone(&finalized),
        }));

    let module = framework.install_module(manifest)?;
    assert_eq!(module.driver_names, ["tool_a", "tool_b"]);
    assert_eq!(module.extension_names, ["upper"]);
    assert_eq!(module.framework_id, framework.id());
    assert_eq!(framework.modules(), [module]);

    framework.create_record("tool_a", "t", &RecordConfig::new())?;
    assert_eq!(framework.call_extension_string("upper", "scan")?, "SCAN");

    framework.shutdown()?;
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_version_mismatch_registers_nothing() -> anyhow::Result<()> {
    let framework = Framework::default();
    let next_major = ApiVersion::new(ApiVersion::CURRENT.major + 1, 0, 0);
    let manifest = ModuleManifest::new("future", origin())
        .with_version(next_major)
        .with_driver(variable_driver("future_driver")?);

    let err = framework.install_module(manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    assert!(framework.driver_names().is_empty());
    assert!(framework.modules().is_empty());
    Ok(())
}

#[test]
fn test_newer_minor_version_is_rejected() -> anyhow::Result<()> {
    let framework = Framework::default();
    let current = ApiVersion::CURRENT;
    let manifest = ModuleManifest::new("ahead", origin())
        .with_version(ApiVersion::new(current.major, current.minor + 1, 0));
    let err = framework.install_module(manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);
    Ok(())
}

#[test]
fn test_driver_collision_leaves_registry_as_before() -> anyhow::Result<()> {
    let framework = Framework::with_builtin_drivers(MonitorConfig::default())?;
    let before = framework.driver_names();

    let manifest = ModuleManifest::new("clashing", origin())
        .with_driver(variable_driver("fresh_driver")?)
        .with_driver(variable_driver("soft_motor")?);
    let err = framework.install_module(manifest).unwrap_err();

    match err {
        CoreError::DuplicateName { namespace, name } => {
            assert_eq!(namespace, Namespace::Driver);
            assert_eq!(name, "soft_motor");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(framework.driver_names(), before);
    assert!(framework.modules().is_empty());
    Ok(())
}

#[test]
fn test_failing_extension_rolls_back_module() -> anyhow::Result<()> {
    let framework = Framework::default();
    let finalized = Arc::new(AtomicUsize::new(0));
    let manifest = ModuleManifest::new("half", origin())
        .with_driver(variable_driver("half_driver")?)
        .with_extension(Box::new(Upper {
            finalized: Arc::clone(&finalized),
        }))
        .with_extension(Box::new(Broken));

    let err = framework.install_module(manifest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(framework.driver_names().is_empty());
    assert!(framework.extension_names().is_empty());
    assert!(framework.modules().is_empty());
    // The extension installed before the failure was finalized during rollback.
    assert_eq!(finalized.load(Ordering::SeqCst), 1);

    // A corrected module with the same name installs cleanly afterwards.
    let retry = ModuleManifest::new("half", origin()).with_driver(variable_driver("half_driver")?);
    framework.install_module(retry)?;
    assert_eq!(framework.driver_names(), ["half_driver"]);
    Ok(())
}

#[test]
fn test_duplicate_module_name_rejected() -> anyhow::Result<()> {
    let framework = Framework::default();
    framework.install_module(ModuleManifest::new("once", origin()))?;
    let err = framework
        .install_module(ModuleManifest::new("once", origin()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);
    assert_eq!(framework.modules().len(), 1);

    let err = framework
        .install_module(ModuleManifest::new("", origin()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NullArgument);
    Ok(())
}

#[test]
fn test_default_script_handler() -> anyhow::Result<()> {
    let framework = Framework::default();
    let err = framework.run_script("print 1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    framework.register_extension(Box::new(Upper {
        finalized: Arc::new(AtomicUsize::new(0)),
    }))?;
    framework.set_default_script_handler("upper")?;
    assert_eq!(framework.default_script_handler().as_deref(), Some("upper"));
    assert_eq!(framework.run_script("move theta 1")?, "MOVE THETA 1");

    let err = framework.set_default_script_handler("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(framework.default_script_handler().as_deref(), Some("upper"));
    Ok(())
}

#[test]
fn test_frameworks_are_independent() -> anyhow::Result<()> {
    let first = Framework::default();
    let second = Framework::default();
    assert_ne!(first.id(), second.id());

    first.install_module(ModuleManifest::new("shared", origin()).with_driver(variable_driver("d")?))?;
    second.install_module(ModuleManifest::new("shared", origin()).with_driver(variable_driver("d")?))?;
    assert_eq!(first.modules()[0].framework_id, first.id());
    assert_eq!(second.modules()[0].framework_id, second.id());
    Ok(())
}

#[test]
fn test_racing_installs_of_one_name_admit_one() -> anyhow::Result<()> {
    let framework = Framework::default();
    let outcomes: Vec<CoreResult<Module>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|i| {
                let framework = &framework;
                scope.spawn(move || {
                    let driver = Driver::builder(format!("racer_{i}"), RecordClass::Variable)
                        .build()?;
                    framework.install_module(
                        ModuleManifest::new("contested", origin()).with_driver(driver),
                    )
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap_or_else(|_| Err(CoreError::Config("worker panicked".into()))))
            .collect()
    });

    let installed = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(installed, 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert_eq!(err.kind(), ErrorKind::DuplicateName);
        }
    }
    assert_eq!(framework.modules().len(), 1);
    // Losing installs registered none of their drivers.
    assert_eq!(framework.driver_names().len(), 1);
    Ok(())
}

#[test]
fn test_install_after_shutdown_is_refused() -> anyhow::Result<()> {
    let framework = Framework::default();
    framework.shutdown()?;
    let err = framework
        .install_module(ModuleManifest::new("late", origin()).with_driver(variable_driver("late_driver")?))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(framework.modules().is_empty());
    assert!(framework.driver_names().is_empty());

    let err = framework
        .register_extension(Box::new(Broken))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    Ok(())
}
