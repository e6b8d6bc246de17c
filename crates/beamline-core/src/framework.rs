//! The framework owner object.
//!
//! A [`Framework`] owns one driver registry, one extension registry, one record database and
//! the list of installed modules. There is no process-wide instance: tests and hosts create
//! as many independent frameworks as they need and tear each down with
//! [`Framework::shutdown`] (also run on drop).
//!
//! Locks are always taken in the order drivers, extensions, records, modules.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::class;
use crate::driver::{Driver, DriverRegistry, RecordConfig};
use crate::drivers;
use crate::error::{CoreError, CoreResult, Namespace};
use crate::extension::{Extension, ExtensionRegistry};
use crate::module::{ApiVersion, Module, ModuleManifest};
use crate::monitor::MonitorConfig;
use crate::database::RecordDatabase;
use crate::record::RecordHandle;

static NEXT_FRAMEWORK_ID: AtomicU64 = AtomicU64::new(1);

/// Owner of every registry and record of one running system.
pub struct Framework {
    id: u64,
    monitor: MonitorConfig,
    drivers: RwLock<DriverRegistry>,
    extensions: Mutex<ExtensionRegistry>,
    records: RwLock<RecordDatabase>,
    modules: RwLock<Vec<Module>>,
    shut_down: Mutex<bool>,
}

impl Framework {
    /// An empty framework with no drivers.
    pub fn new(monitor: MonitorConfig) -> Self {
        let id = NEXT_FRAMEWORK_ID.fetch_add(1, Ordering::Relaxed);
        info!(framework = id, "Framework created");
        Self {
            id,
            monitor,
            drivers: RwLock::new(DriverRegistry::new()),
            extensions: Mutex::new(ExtensionRegistry::new()),
            records: RwLock::new(RecordDatabase::new()),
            modules: RwLock::new(Vec::new()),
            shut_down: Mutex::new(false),
        }
    }

    /// A framework with the built-in soft drivers registered.
    pub fn with_builtin_drivers(monitor: MonitorConfig) -> CoreResult<Self> {
        let framework = Self::new(monitor);
        let builtin = drivers::builtin(&framework.monitor)?;
        framework.drivers.write().register_all(builtin)?;
        Ok(framework)
    }

    /// Process-unique identifier of this framework.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Monitor thread settings handed to drivers that spawn monitors.
    pub fn monitor_config(&self) -> &MonitorConfig {
        &self.monitor
    }

    // =========================================================================
    // Drivers and extensions
    // =========================================================================

    /// Register one driver. Refused after shutdown.
    pub fn register_driver(&self, driver: Driver) -> CoreResult<Arc<Driver>> {
        let mut registry = self.drivers.write();
        self.ensure_running("register_driver")?;
        registry.register(driver)
    }

    /// Look up a driver by type name.
    pub fn resolve_driver(&self, type_name: &str) -> CoreResult<Arc<Driver>> {
        self.drivers.read().resolve(type_name)
    }

    /// Registered driver type names in registration order.
    pub fn driver_names(&self) -> Vec<String> {
        self.drivers.read().names()
    }

    /// Register an extension and run its `initialize` hook.
    pub fn register_extension(&self, extension: Box<dyn Extension>) -> CoreResult<()> {
        let mut registry = self.extensions.lock();
        self.ensure_running("register_extension")?;
        registry.register_and_initialize(extension)
    }

    /// Registered extension names.
    pub fn extension_names(&self) -> Vec<String> {
        self.extensions.lock().names()
    }

    /// Call an extension with an argument list.
    pub fn call_extension(&self, name: &str, args: &[String]) -> CoreResult<String> {
        self.extensions.lock().call(name, args)
    }

    /// Call an extension with a single string.
    pub fn call_extension_string(&self, name: &str, text: &str) -> CoreResult<String> {
        self.extensions.lock().call_string(name, text)
    }

    /// Route [`Framework::run_script`] to the named extension.
    pub fn set_default_script_handler(&self, name: &str) -> CoreResult<()> {
        self.extensions.lock().set_default_script_handler(name)
    }

    /// Name of the extension scripts are routed to, if any.
    pub fn default_script_handler(&self) -> Option<String> {
        self.extensions
            .lock()
            .default_script_handler()
            .map(str::to_string)
    }

    /// Run `text` through the default script handler.
    pub fn run_script(&self, text: &str) -> CoreResult<String> {
        self.extensions.lock().call_default_script(text)
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Install a module's drivers and extensions, all or nothing.
    ///
    /// The version is checked before anything else. Drivers are registered as one batch;
    /// extensions are then registered and initialized one by one. Any failure unregisters
    /// everything this module had registered so far.
    pub fn install_module(&self, manifest: ModuleManifest) -> CoreResult<Module> {
        let ModuleManifest {
            name,
            version,
            drivers,
            extensions,
            origin,
        } = manifest;

        if !version.is_compatible_with(&ApiVersion::CURRENT) {
            warn!(module = %name, found = %version, expected = %ApiVersion::CURRENT, "Module version mismatch");
            return Err(CoreError::VersionMismatch {
                module: name,
                found: version.to_string(),
                expected: ApiVersion::CURRENT.to_string(),
            });
        }
        if name.is_empty() {
            return Err(CoreError::NullArgument("module name"));
        }
        let mut registry = self.drivers.write();
        let mut ext_registry = self.extensions.lock();
        let mut modules = self.modules.write();
        self.ensure_running("install_module")?;
        if modules.iter().any(|m| m.name == name) {
            return Err(CoreError::duplicate(Namespace::Module, name));
        }

        let registered = registry.register_all(drivers)?;
        let driver_names: Vec<String> = registered
            .iter()
            .map(|d| d.type_name().to_string())
            .collect();

        let mut extension_names: Vec<String> = Vec::with_capacity(extensions.len());
        for extension in extensions {
            let ext_name = extension.name().to_string();
            if let Err(err) = ext_registry.register_and_initialize(extension) {
                for done in extension_names.iter().rev() {
                    if let Err(fin) = ext_registry.finalize_and_remove(done.as_str()) {
                        warn!(extension = %done, error = %fin, "Finalize failed during rollback");
                    }
                }
                for driver in driver_names.iter().rev() {
                    registry.unregister(driver);
                }
                warn!(module = %name, extension = %ext_name, error = %err, "Module installation rolled back");
                return Err(err);
            }
            extension_names.push(ext_name);
        }

        let module = Module {
            name,
            version,
            driver_names,
            extension_names,
            origin,
            framework_id: self.id,
        };
        info!(
            module = %module.name,
            origin = %module.origin,
            drivers = module.driver_names.len(),
            extensions = module.extension_names.len(),
            "Module installed"
        );
        modules.push(module.clone());
        Ok(module)
    }

    /// Installed modules in installation order.
    pub fn modules(&self) -> Vec<Module> {
        self.modules.read().clone()
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Create, initialize and open one record. Refused after shutdown.
    pub fn create_record(
        &self,
        type_name: &str,
        name: &str,
        config: &RecordConfig,
    ) -> CoreResult<RecordHandle> {
        let drivers = self.drivers.read();
        let mut records = self.records.write();
        self.ensure_running("create_record")?;
        records.create(&drivers, type_name, name, config)
    }

    /// Create a record from one `name type args...` line.
    pub fn create_record_from_line(&self, line: &str) -> CoreResult<RecordHandle> {
        let created = self.load_database(line)?;
        match created.as_slice() {
            [name] => self.find_record(name),
            _ => Err(CoreError::Config(format!(
                "expected exactly one record in '{}'",
                line.trim()
            ))),
        }
    }

    /// Load a whole database text. See [`RecordDatabase::load`].
    pub fn load_database(&self, text: &str) -> CoreResult<Vec<String>> {
        let drivers = self.drivers.read();
        let mut records = self.records.write();
        self.ensure_running("load_database")?;
        records.load(&drivers, text)
    }

    /// The record named `name`.
    pub fn find_record(&self, name: &str) -> CoreResult<RecordHandle> {
        self.records.read().find(name)
    }

    /// Close, delete and unlink the record named `name`.
    pub fn delete_record(&self, name: &str) -> CoreResult<()> {
        self.records.write().delete(name)
    }

    /// Record names in insertion order.
    pub fn record_names(&self) -> Vec<String> {
        self.records.read().names()
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    /// Visit every record in insertion order.
    pub fn for_each_record<F>(&self, visitor: F) -> CoreResult<()>
    where
        F: FnMut(&RecordHandle) -> CoreResult<()>,
    {
        self.records.read().for_each(visitor)
    }

    /// Refresh every device record through its class table. Returns per-record failures.
    pub fn update_all(&self) -> Vec<(String, CoreError)> {
        let handles: Vec<RecordHandle> = self.records.read().iter().cloned().collect();
        let mut failures = Vec::new();
        for handle in handles {
            let mut record = handle.lock();
            if let Err(err) = class::update(&mut record) {
                warn!(record = %record.name(), error = %err, "Update failed");
                failures.push((record.name().to_string(), err));
            }
        }
        failures
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    fn ensure_running(&self, operation: &'static str) -> CoreResult<()> {
        if *self.shut_down.lock() {
            return Err(CoreError::UnsupportedOperation {
                target: format!("framework {} after shutdown", self.id),
                operation,
            });
        }
        Ok(())
    }

    /// Close every record (newest first), then finalize every extension. Idempotent.
    ///
    /// Afterwards the framework refuses new records, drivers and modules.
    pub fn shutdown(&self) -> CoreResult<()> {
        {
            let mut done = self.shut_down.lock();
            if *done {
                return Ok(());
            }
            *done = true;
        }
        let mut errors = self.records.write().close_all();
        errors.extend(self.extensions.lock().finalize_all());
        info!(framework = self.id, errors = errors.len(), "Framework shut down");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ShutdownFailed(errors))
        }
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(framework = self.id, error = %err, "Framework shutdown reported errors");
        }
    }
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("id", &self.id)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}
