//! `beamline-core`
//!
//! Record database, field reflection and driver dispatch for beamline instrumentation.
//!
//! ## Layers
//!
//! - **Fields**: [`FieldSchema`] tables describe the byte layout of a payload block and
//!   [`FieldBlock`] reads and writes fields by name, including varargs arrays whose length
//!   lives in another field.
//! - **Drivers**: a [`Driver`] combines a class (motor, analog input, ...) with a
//!   driver-specific type schema, lifecycle hooks and a class operation table.
//! - **Records**: named instances of a driver, owned by a [`RecordDatabase`].
//! - **Modules and extensions**: bundles of drivers and extensions installed into a live
//!   [`Framework`] all-or-nothing.
//! - **Monitor threads**: [`MonitorThread`] runs a device's acquisition loop and accepts
//!   asynchronous commands.
//!
//! ## Example
//!
//! ```rust
//! use beamline_core::prelude::*;
//!
//! # fn main() -> CoreResult<()> {
//! let framework = Framework::with_builtin_drivers(MonitorConfig::default())?;
//! framework.load_database("theta soft_motor 0.0 1.0 -10.0 10.0 deg")?;
//!
//! let theta = framework.find_record("theta")?;
//! motor::move_absolute(&mut theta.lock(), 2.5)?;
//! assert_eq!(theta.lock().get_f64("position")?, 2.5);
//! # framework.shutdown()
//! # }
//! ```

pub mod class;
pub mod database;
pub mod driver;
pub mod drivers;
pub mod error;
pub mod extension;
pub mod field;
pub mod framework;
pub mod module;
pub mod monitor;
pub mod record;

pub use database::RecordDatabase;
pub use driver::{
    ClassOps, DefaultLifecycle, Driver, DriverBuilder, DriverRegistry, RecordClass,
    RecordConfig, RecordLifecycle, RecordLookup, Superclass,
};
pub use error::{CoreError, CoreResult, DriverError, DriverErrorKind, ErrorKind, Namespace};
pub use extension::{Extension, ExtensionRegistry};
pub use field::{FieldBlock, FieldDescriptor, FieldFlags, FieldSchema, FieldType, FieldValue};
pub use framework::Framework;
pub use module::{ApiVersion, Module, ModuleManifest, ModuleOrigin};
pub use monitor::{MonitorCommand, MonitorConfig, MonitorHandler, MonitorStatus, MonitorThread};
pub use record::{Record, RecordHandle, RecordState};

/// Commonly used types and class algorithms.
pub mod prelude {
    pub use crate::class::{ainput, aoutput, mce, motor};
    pub use crate::class::{AnalogInputOps, AnalogOutputOps, MceOps, MotorOps};
    pub use crate::driver::{
        ClassOps, Driver, RecordClass, RecordConfig, RecordLifecycle, RecordLookup,
    };
    pub use crate::error::{CoreError, CoreResult, ErrorKind};
    pub use crate::extension::Extension;
    pub use crate::field::{FieldFlags, FieldType, FieldValue, SchemaBuilder, StructKind};
    pub use crate::framework::Framework;
    pub use crate::module::{ApiVersion, ModuleManifest, ModuleOrigin};
    pub use crate::monitor::{MonitorConfig, MonitorStatus};
    pub use crate::record::{Record, RecordHandle};
}
