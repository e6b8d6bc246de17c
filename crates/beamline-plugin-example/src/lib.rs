//! Example module library.
//!
//! Exports one analog input driver, `plugin_counter`, whose raw reading grows by
//! `increment` on every read, and one extension, `echo`, which returns its arguments.
//!
//! Build with `cargo build -p beamline-plugin-example` and point a
//! [`beamline_plugin_api::ModuleLoader`] at the target directory.

#![allow(unsafe_code)] // export_root_module emits an unsafe extern static

use beamline_core::field::{FieldFlags, FieldType, SchemaBuilder, StructKind};
use beamline_core::RecordClass;
use beamline_plugin_api::prelude::*;

/// Name the module installs under.
pub const MODULE_NAME: &str = "plugin_example";
/// Type name of the counter driver.
pub const COUNTER_TYPE: &str = "plugin_counter";
/// Name of the echo extension.
pub const ECHO_EXTENSION: &str = "echo";

#[export_root_module]
/// Root module exported to the loader.
pub fn get_root_module() -> BeamlineModule_Ref {
    BeamlineModule {
        abi_version,
        module_name,
        drivers,
        extensions,
    }
    .leak_into_prefix()
}

#[sabi_extern_fn]
fn abi_version() -> AbiVersion {
    AbiVersion::CURRENT
}

#[sabi_extern_fn]
fn module_name() -> RString {
    RString::from(MODULE_NAME)
}

#[sabi_extern_fn]
fn drivers() -> RVec<FfiDriverEntry> {
    let mut table = RVec::new();
    table.push(FfiDriverEntry::new(DriverFfi_TO::from_value(
        CounterDriver,
        TD_Opaque,
    )));
    table.push(FfiDriverEntry::sentinel());
    table
}

#[sabi_extern_fn]
fn extensions() -> RVec<ExtensionFfiBox> {
    let mut list = RVec::new();
    list.push(ExtensionFfi_TO::from_value(
        EchoExtension { initialized: false },
        TD_Opaque,
    ));
    list
}

// =============================================================================
// plugin_counter
// =============================================================================

struct CounterDriver;

impl DriverFfi for CounterDriver {
    fn type_name(&self) -> RString {
        RString::from(COUNTER_TYPE)
    }

    fn class_tag(&self) -> u8 {
        RecordClass::AnalogInput.tag()
    }

    fn fields(&self) -> RVec<FfiFieldDescriptor> {
        SchemaBuilder::new(StructKind::Type)
            .scalar("increment", FieldType::Double, FieldFlags::IN_DESCRIPTION)
            .scalar(
                "count",
                FieldType::UInt32,
                FieldFlags::READ_ONLY | FieldFlags::IN_SUMMARY,
            )
            .build()
            .map(|schema| schema_rows(&schema))
            .unwrap_or_default()
    }

    fn supports(&self, verb: FfiVerb) -> bool {
        matches!(verb, FfiVerb::Open | FfiVerb::ReadRaw)
    }

    fn invoke(&self, verb: FfiVerb, record: FfiRecord, _argument: f64) -> FfiResult<FfiReply> {
        match verb {
            FfiVerb::Open => RResult::ROk(FfiReply::done().with_update("count", 0)),
            FfiVerb::ReadRaw => {
                let reading = record
                    .get_f64("count")
                    .and_then(|count| Ok((count, record.get_f64("increment")?)));
                match reading {
                    Ok((count, increment)) => RResult::ROk(
                        FfiReply::value((count + 1.0) * increment).with_update("count", count + 1.0),
                    ),
                    Err(err) => RResult::RErr(err),
                }
            }
            other => RResult::RErr(FfiError::unsupported(other.name())),
        }
    }
}

// =============================================================================
// echo
// =============================================================================

struct EchoExtension {
    initialized: bool,
}

impl EchoExtension {
    fn ready(&self) -> Result<(), FfiError> {
        if self.initialized {
            Ok(())
        } else {
            Err(FfiError::new(FfiErrorKind::Other, "echo is not initialized"))
        }
    }
}

impl ExtensionFfi for EchoExtension {
    fn name(&self) -> RString {
        RString::from(ECHO_EXTENSION)
    }

    fn initialize(&mut self) -> FfiResult<()> {
        self.initialized = true;
        RResult::ROk(())
    }

    fn finalize(&mut self) -> FfiResult<()> {
        self.initialized = false;
        RResult::ROk(())
    }

    fn call(&mut self, args: RVec<RString>) -> FfiResult<RString> {
        if let Err(err) = self.ready() {
            return RResult::RErr(err);
        }
        let words: Vec<&str> = args.iter().map(RString::as_str).collect();
        RResult::ROk(RString::from(words.join(" ")))
    }

    fn call_string(&mut self, text: RString) -> FfiResult<RString> {
        if let Err(err) = self.ready() {
            return RResult::RErr(err);
        }
        RResult::ROk(text)
    }
}
