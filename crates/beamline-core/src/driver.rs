//! Driver registry and the two dispatch layers.
//!
//! A [`Driver`] bundles everything needed to instantiate a record type from configuration
//! text:
//!
//! ```text
//! ┌───────────────────────── Driver ─────────────────────────┐
//! │ type_name    "soft_motor"                                │
//! │ class        Motor (superclass Device)                   │
//! │ lifecycle    Arc<dyn RecordLifecycle>  create/finish_init│
//! │                                        open/close/delete │
//! │ class_ops    ClassOps::Motor(Arc<dyn MotorOps>)          │
//! │ class_schema standard motor schema   (StructKind::Class) │
//! │ type_schema  driver-private fields   (StructKind::Type)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The lifecycle layer has the same shape for every record, so the database can manage any
//! record without knowing its type. The class layer varies by [`RecordClass`]; generic
//! algorithms in [`crate::class`] select it by class tag and call the driver's slot. Slots a
//! driver does not implement return `UnsupportedOperation`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::class::{AnalogInputOps, AnalogOutputOps, MceOps, MotorOps};
use crate::error::{CoreError, CoreResult, Namespace};
use crate::field::{tokenize, FieldSchema, StructKind};
use crate::record::{Record, RecordHandle};

/// Broad category of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Superclass {
    Device,
    Variable,
    Operation,
    Server,
    Interface,
}

impl fmt::Display for Superclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Superclass::Device => "device",
            Superclass::Variable => "variable",
            Superclass::Operation => "operation",
            Superclass::Server => "server",
            Superclass::Interface => "interface",
        };
        f.write_str(label)
    }
}

/// Record class, selecting the class-specific dispatch table and standard schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordClass {
    Motor = 1,
    AnalogInput = 2,
    AnalogOutput = 3,
    Mce = 4,
    Variable = 5,
}

impl RecordClass {
    /// Every class, in tag order.
    pub const ALL: [RecordClass; 5] = [
        RecordClass::Motor,
        RecordClass::AnalogInput,
        RecordClass::AnalogOutput,
        RecordClass::Mce,
        RecordClass::Variable,
    ];

    /// Device or variable.
    pub fn superclass(self) -> Superclass {
        match self {
            RecordClass::Variable => Superclass::Variable,
            _ => Superclass::Device,
        }
    }

    /// Stable numeric tag used across the module ABI.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`RecordClass::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    /// Lower-case name used in messages and dumps.
    pub fn name(self) -> &'static str {
        match self {
            RecordClass::Motor => "motor",
            RecordClass::AnalogInput => "analog_input",
            RecordClass::AnalogOutput => "analog_output",
            RecordClass::Mce => "mce",
            RecordClass::Variable => "variable",
        }
    }

    /// Class-level schema shared by every driver of this class.
    pub fn standard_schema(self) -> CoreResult<Arc<FieldSchema>> {
        static SCHEMAS: OnceLock<Vec<CoreResult<Arc<FieldSchema>>>> = OnceLock::new();
        let schemas = SCHEMAS.get_or_init(|| {
            Self::ALL
                .iter()
                .map(|class| {
                    let schema = match class {
                        RecordClass::Motor => crate::class::motor::schema(),
                        RecordClass::AnalogInput => crate::class::ainput::schema(),
                        RecordClass::AnalogOutput => crate::class::aoutput::schema(),
                        RecordClass::Mce => crate::class::mce::schema(),
                        RecordClass::Variable => Ok(FieldSchema::empty(StructKind::Class)),
                    };
                    schema.map(Arc::new)
                })
                .collect()
        });
        let index = Self::ALL.iter().position(|c| *c == self).unwrap_or_default();
        schemas[index].clone()
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tokens of a record description, excluding the instance and type names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordConfig {
    tokens: Vec<String>,
}

impl RecordConfig {
    /// An empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments from already split tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Tokenize configuration text; quotes and `#` comments follow [`tokenize`].
    pub fn parse(text: &str) -> CoreResult<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
        })
    }

    /// The argument tokens in order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// True when no arguments were given.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Read access to the records of a database, used to resolve cross-references.
pub trait RecordLookup {
    fn find(&self, name: &str) -> Option<RecordHandle>;

    /// Class of a record, readable without locking it.
    fn class_of(&self, name: &str) -> Option<RecordClass>;

    fn contains(&self, name: &str) -> bool {
        self.class_of(name).is_some()
    }
}

/// Lifecycle hooks every driver provides.
///
/// The database allocates both payload blocks from the driver's schemas before calling
/// `create`. All hooks have working defaults; a driver overrides only what it needs.
pub trait RecordLifecycle: Send + Sync {
    /// Populate the record from its configuration. The default parses the description
    /// fields of both blocks, class fields first.
    fn create(&self, record: &mut Record, config: &RecordConfig) -> CoreResult<()> {
        record.parse_description(config.tokens())
    }

    /// Resolve cross-references. The default checks that every non-empty `RecordRef`
    /// field names an existing record.
    fn finish_init(&self, record: &mut Record, lookup: &dyn RecordLookup) -> CoreResult<()> {
        for (field, target) in record.record_refs()? {
            if !lookup.contains(&target) {
                return Err(CoreError::invalid(
                    field,
                    format!("record '{}' does not exist", target),
                ));
            }
        }
        Ok(())
    }

    fn open(&self, _record: &mut Record) -> CoreResult<()> {
        Ok(())
    }

    fn close(&self, _record: &mut Record) -> CoreResult<()> {
        Ok(())
    }

    /// Release driver resources before the blocks are freed.
    fn delete(&self, _record: &mut Record) -> CoreResult<()> {
        Ok(())
    }
}

/// Lifecycle with every hook left at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLifecycle;

impl RecordLifecycle for DefaultLifecycle {}

/// Class-specific dispatch table of a driver.
#[derive(Clone)]
pub enum ClassOps {
    Motor(Arc<dyn MotorOps>),
    AnalogInput(Arc<dyn AnalogInputOps>),
    AnalogOutput(Arc<dyn AnalogOutputOps>),
    Mce(Arc<dyn MceOps>),
    /// Variables have no class verbs.
    Variable,
}

impl ClassOps {
    /// The class this table dispatches for.
    pub fn class(&self) -> RecordClass {
        match self {
            ClassOps::Motor(_) => RecordClass::Motor,
            ClassOps::AnalogInput(_) => RecordClass::AnalogInput,
            ClassOps::AnalogOutput(_) => RecordClass::AnalogOutput,
            ClassOps::Mce(_) => RecordClass::Mce,
            ClassOps::Variable => RecordClass::Variable,
        }
    }
}

impl fmt::Debug for ClassOps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassOps::{:?}", self.class())
    }
}

/// An immutable registration of a record type.
pub struct Driver {
    type_name: String,
    class: RecordClass,
    lifecycle: Arc<dyn RecordLifecycle>,
    class_ops: ClassOps,
    class_schema: Arc<FieldSchema>,
    type_schema: Arc<FieldSchema>,
}

impl Driver {
    /// Start building a driver for `type_name` of `class`.
    pub fn builder(type_name: impl Into<String>, class: RecordClass) -> DriverBuilder {
        DriverBuilder::new(type_name, class)
    }

    /// Type name records are created with.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Record class of this driver.
    pub fn class(&self) -> RecordClass {
        self.class
    }

    /// Superclass of this driver's class.
    pub fn superclass(&self) -> Superclass {
        self.class.superclass()
    }

    /// Lifecycle hooks run by the database.
    pub fn lifecycle(&self) -> &dyn RecordLifecycle {
        self.lifecycle.as_ref()
    }

    /// Class verbs.
    pub fn class_ops(&self) -> &ClassOps {
        &self.class_ops
    }

    /// Schema of the class block.
    pub fn class_schema(&self) -> &Arc<FieldSchema> {
        &self.class_schema
    }

    /// Schema of the type block.
    pub fn type_schema(&self) -> &Arc<FieldSchema> {
        &self.type_schema
    }

    /// Check the dispatch table, schema kinds and field namespace are consistent.
    pub fn validate(&self) -> CoreResult<()> {
        if self.type_name.is_empty() {
            return Err(CoreError::NullArgument("driver type name"));
        }
        if self.class_ops.class() != self.class {
            return Err(CoreError::CorruptState(format!(
                "driver '{}' is a {} but carries a {} dispatch table",
                self.type_name,
                self.class,
                self.class_ops.class()
            )));
        }
        if self.class_schema.kind() != StructKind::Class
            || self.type_schema.kind() != StructKind::Type
        {
            return Err(CoreError::CorruptState(format!(
                "driver '{}' has schemas of the wrong block kind",
                self.type_name
            )));
        }
        if *self.class_schema != *self.class.standard_schema()? {
            return Err(CoreError::CorruptState(format!(
                "driver '{}' does not use the standard {} class schema",
                self.type_name, self.class
            )));
        }
        if let Some(field) = self
            .type_schema
            .iter()
            .find(|f| self.class_schema.contains(&f.name))
        {
            return Err(CoreError::duplicate(Namespace::Field, field.name.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("type_name", &self.type_name)
            .field("class", &self.class)
            .field("type_fields", &self.type_schema.len())
            .finish()
    }
}

/// Builder for [`Driver`].
pub struct DriverBuilder {
    type_name: String,
    class: RecordClass,
    lifecycle: Arc<dyn RecordLifecycle>,
    class_ops: Option<ClassOps>,
    type_schema: Option<FieldSchema>,
}

impl DriverBuilder {
    /// Same as [`Driver::builder`].
    pub fn new(type_name: impl Into<String>, class: RecordClass) -> Self {
        Self {
            type_name: type_name.into(),
            class,
            lifecycle: Arc::new(DefaultLifecycle),
            class_ops: None,
            type_schema: None,
        }
    }

    /// Use `lifecycle` for record lifecycle hooks.
    pub fn lifecycle(mut self, lifecycle: impl RecordLifecycle + 'static) -> Self {
        self.lifecycle = Arc::new(lifecycle);
        self
    }

    /// Use an already shared lifecycle.
    pub fn shared_lifecycle(mut self, lifecycle: Arc<dyn RecordLifecycle>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Set the class dispatch table. It must match the driver's class.
    pub fn class_ops(mut self, ops: ClassOps) -> Self {
        self.class_ops = Some(ops);
        self
    }

    /// Set the driver-specific type block schema.
    pub fn type_schema(mut self, schema: FieldSchema) -> Self {
        self.type_schema = Some(schema);
        self
    }

    /// Validate and build the driver.
    pub fn build(self) -> CoreResult<Driver> {
        let class_ops = match (self.class_ops, self.class) {
            (Some(ops), _) => ops,
            (None, RecordClass::Variable) => ClassOps::Variable,
            (None, class) => {
                return Err(CoreError::CorruptState(format!(
                    "driver '{}' has no {} dispatch table",
                    self.type_name, class
                )))
            }
        };
        let driver = Driver {
            type_name: self.type_name,
            class: self.class,
            lifecycle: self.lifecycle,
            class_ops,
            class_schema: self.class.standard_schema()?,
            type_schema: Arc::new(
                self.type_schema
                    .unwrap_or_else(|| FieldSchema::empty(StructKind::Type)),
            ),
        };
        driver.validate()?;
        Ok(driver)
    }
}

/// Registry of drivers keyed by type name, iterated in registration order.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<Driver>>,
    order: Vec<String>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver. An existing type name is never overridden.
    pub fn register(&mut self, driver: Driver) -> CoreResult<Arc<Driver>> {
        driver.validate()?;
        let name = driver.type_name().to_string();
        if self.drivers.contains_key(&name) {
            warn!(driver = %name, "Rejected duplicate driver registration");
            return Err(CoreError::duplicate(Namespace::Driver, name));
        }
        let driver = Arc::new(driver);
        self.drivers.insert(name.clone(), Arc::clone(&driver));
        self.order.push(name.clone());
        debug!(driver = %name, class = %driver.class(), "Registered driver");
        Ok(driver)
    }

    /// Register every driver or none of them.
    pub fn register_all(&mut self, drivers: Vec<Driver>) -> CoreResult<Vec<Arc<Driver>>> {
        let mut registered: Vec<Arc<Driver>> = Vec::with_capacity(drivers.len());
        for driver in drivers {
            match self.register(driver) {
                Ok(driver) => registered.push(driver),
                Err(err) => {
                    for done in registered.iter().rev() {
                        self.unregister(done.type_name());
                    }
                    return Err(err);
                }
            }
        }
        info!(count = registered.len(), "Registered driver batch");
        Ok(registered)
    }

    /// The driver for `type_name`, or [`CoreError::UnknownType`].
    pub fn resolve(&self, type_name: &str) -> CoreResult<Arc<Driver>> {
        self.drivers
            .get(type_name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownType(type_name.to_string()))
    }

    /// True when `type_name` is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.drivers.contains_key(type_name)
    }

    /// Remove a driver. Only used to roll back a failed batch; records already created
    /// keep their own reference.
    pub fn unregister(&mut self, type_name: &str) -> Option<Arc<Driver>> {
        let removed = self.drivers.remove(type_name)?;
        self.order.retain(|n| n != type_name);
        debug!(driver = %type_name, "Unregistered driver");
        Some(removed)
    }

    /// Registered drivers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Driver>> {
        self.order.iter().filter_map(|name| self.drivers.get(name))
    }

    /// Registered type names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// True when no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
