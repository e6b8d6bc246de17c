//! Record instances.
//!
//! A [`Record`] owns its two payload blocks (class and type) and shares its [`Driver`]. Field
//! names form a single namespace across both blocks; driver registration guarantees they do
//! not collide, so a name resolves to exactly one block.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::driver::{Driver, RecordClass, Superclass};
use crate::error::{CoreError, CoreResult};
use crate::field::{
    quote, DescriptionParser, FieldBlock, FieldDescriptor, FieldFlags, FieldType, FieldValue,
    RECORD_NAME_LENGTH,
};

/// Shared handle to a record in a database.
pub type RecordHandle = Arc<Mutex<Record>>;

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// `create` has run.
    Created,
    /// `finish_init` has run.
    Initialized,
    Open,
    Closed,
}

/// One named instance of a record type.
pub struct Record {
    name: String,
    driver: Arc<Driver>,
    class_block: FieldBlock,
    type_block: FieldBlock,
    runtime: Option<Box<dyn Any + Send>>,
    state: RecordState,
}

impl Record {
    /// Allocate a record with zeroed blocks laid out by the driver's schemas.
    pub fn allocate(name: &str, driver: Arc<Driver>) -> CoreResult<Self> {
        if name.is_empty() {
            return Err(CoreError::NullArgument("record name"));
        }
        if name.len() > RECORD_NAME_LENGTH {
            return Err(CoreError::invalid(
                "name",
                format!("'{}' is longer than {} bytes", name, RECORD_NAME_LENGTH),
            ));
        }
        let class_block = FieldBlock::allocate(Arc::clone(driver.class_schema()))?;
        let type_block = FieldBlock::allocate(Arc::clone(driver.type_schema()))?;
        Ok(Self {
            name: name.to_string(),
            driver,
            class_block,
            type_block,
            runtime: None,
            state: RecordState::Created,
        })
    }

    /// Record name, unique within its database.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The driver this record was created by.
    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Type name of the record's driver.
    pub fn type_name(&self) -> &str {
        self.driver.type_name()
    }

    /// Record class of the record's driver.
    pub fn class(&self) -> RecordClass {
        self.driver.class()
    }

    /// Device or variable.
    pub fn superclass(&self) -> Superclass {
        self.driver.superclass()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    /// Class block, laid out by the class schema.
    pub fn class_block(&self) -> &FieldBlock {
        &self.class_block
    }

    /// Mutable class block.
    pub fn class_block_mut(&mut self) -> &mut FieldBlock {
        &mut self.class_block
    }

    /// Type block, laid out by the driver's type schema.
    pub fn type_block(&self) -> &FieldBlock {
        &self.type_block
    }

    /// Mutable type block.
    pub fn type_block_mut(&mut self) -> &mut FieldBlock {
        &mut self.type_block
    }

    /// Error for a class verb this record's driver leaves out.
    pub fn unsupported(&self, operation: &'static str) -> CoreError {
        CoreError::UnsupportedOperation {
            target: format!("record '{}' (driver '{}')", self.name, self.type_name()),
            operation,
        }
    }

    // =========================================================================
    // Field access
    // =========================================================================

    fn block(&self, field: &str) -> CoreResult<&FieldBlock> {
        if self.class_block.schema().contains(field) {
            Ok(&self.class_block)
        } else if self.type_block.schema().contains(field) {
            Ok(&self.type_block)
        } else {
            Err(CoreError::FieldNotFound(field.to_string()))
        }
    }

    fn block_mut(&mut self, field: &str) -> CoreResult<&mut FieldBlock> {
        if self.class_block.schema().contains(field) {
            Ok(&mut self.class_block)
        } else if self.type_block.schema().contains(field) {
            Ok(&mut self.type_block)
        } else {
            Err(CoreError::FieldNotFound(field.to_string()))
        }
    }

    /// Descriptor of `field`, from whichever block declares it.
    pub fn descriptor(&self, field: &str) -> CoreResult<&FieldDescriptor> {
        self.block(field)?.descriptor(field)
    }

    /// Names of all fields, class fields first.
    pub fn field_names(&self) -> Vec<&str> {
        self.class_block
            .schema()
            .iter()
            .chain(self.type_block.schema().iter())
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Read a whole field.
    pub fn get_field(&self, field: &str) -> CoreResult<FieldValue> {
        self.block(field)?.get(field)
    }

    /// Client write; read-only fields are rejected.
    pub fn set_field(&mut self, field: &str, value: impl Into<FieldValue>) -> CoreResult<()> {
        self.block_mut(field)?.set(field, value)
    }

    /// Driver write; ignores the read-only flag.
    pub fn store_field(&mut self, field: &str, value: impl Into<FieldValue>) -> CoreResult<()> {
        self.block_mut(field)?.store(field, value)
    }

    /// Read one array element.
    pub fn get_element(&self, field: &str, index: &[usize]) -> CoreResult<FieldValue> {
        self.block(field)?.get_element(field, index)
    }

    /// Client write of one array element. Read-only fields are refused.
    pub fn set_element(
        &mut self,
        field: &str,
        index: &[usize],
        value: impl Into<FieldValue>,
    ) -> CoreResult<()> {
        self.block_mut(field)?.set_element(field, index, value)
    }

    /// Driver write of one array element; ignores the read-only flag.
    pub fn store_element(
        &mut self,
        field: &str,
        index: &[usize],
        value: impl Into<FieldValue>,
    ) -> CoreResult<()> {
        self.block_mut(field)?.store_element(field, index, value)
    }

    /// Read a field as text.
    pub fn get_field_text(&self, field: &str) -> CoreResult<String> {
        self.block(field)?.get_text(field)
    }

    /// Client write from text. Read-only fields are refused.
    pub fn set_field_text(&mut self, field: &str, text: &str) -> CoreResult<()> {
        self.block_mut(field)?.set_text(field, text)
    }

    /// Driver write from text; ignores the read-only flag.
    pub fn store_field_text(&mut self, field: &str, text: &str) -> CoreResult<()> {
        self.block_mut(field)?.store_text(field, text)
    }

    /// Apply several driver writes from text, all or nothing.
    ///
    /// On the first failure both blocks are restored to their state before the call.
    pub fn store_field_texts<'a, I>(&mut self, updates: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let class_block = self.class_block.clone();
        let type_block = self.type_block.clone();
        for (field, text) in updates {
            if let Err(err) = self.store_field_text(field, text) {
                self.class_block = class_block;
                self.type_block = type_block;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Read a numeric scalar as `f64`.
    pub fn get_f64(&self, field: &str) -> CoreResult<f64> {
        self.block(field)?.get_f64(field)
    }

    /// Read an integer scalar as `i64`.
    pub fn get_i64(&self, field: &str) -> CoreResult<i64> {
        self.block(field)?.get_i64(field)
    }

    /// Read a string or record reference field.
    pub fn get_string(&self, field: &str) -> CoreResult<String> {
        self.block(field)?.get_string(field)
    }

    /// Current element count of `field`.
    pub fn length_of(&self, field: &str) -> CoreResult<usize> {
        self.block(field)?.length_of(field)
    }

    /// Element count storage exists for.
    pub fn capacity_of(&self, field: &str) -> CoreResult<usize> {
        self.block(field)?.capacity_of(field)
    }

    /// Set the storage capacity of a varargs field.
    pub fn reserve_varargs(&mut self, field: &str, capacity: usize) -> CoreResult<()> {
        self.block_mut(field)?.reserve_varargs(field, capacity)
    }

    /// Non-empty `RecordRef` scalars as `(field, target record)` pairs.
    pub fn record_refs(&self) -> CoreResult<Vec<(String, String)>> {
        let mut refs = Vec::new();
        for block in [&self.class_block, &self.type_block] {
            for desc in block.schema().iter() {
                if desc.field_type == FieldType::RecordRef && desc.is_scalar() {
                    let target = block.get_string(&desc.name)?;
                    if !target.is_empty() {
                        refs.push((desc.name.clone(), target));
                    }
                }
            }
        }
        Ok(refs)
    }

    // =========================================================================
    // Driver runtime state
    // =========================================================================

    /// Attach driver-private runtime state such as a monitor thread.
    pub fn set_runtime<T: Any + Send>(&mut self, state: T) {
        self.runtime = Some(Box::new(state));
    }

    /// Borrow the runtime state if it is a `T`.
    pub fn runtime<T: Any + Send>(&self) -> Option<&T> {
        self.runtime.as_deref()?.downcast_ref()
    }

    /// Mutably borrow the runtime state if it is a `T`.
    pub fn runtime_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.runtime.as_deref_mut()?.downcast_mut()
    }

    /// Detach the runtime state if it has type `T`.
    pub fn take_runtime<T: Any + Send>(&mut self) -> Option<T> {
        if !self.runtime.as_deref()?.is::<T>() {
            return None;
        }
        let boxed = self.runtime.take()?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }

    /// True when runtime state is attached.
    pub fn has_runtime(&self) -> bool {
        self.runtime.is_some()
    }

    // =========================================================================
    // Text and JSON views
    // =========================================================================

    /// Fill the description fields of both blocks, class fields first.
    pub fn parse_description(&mut self, tokens: &[String]) -> CoreResult<()> {
        let mut parser = DescriptionParser::new(tokens);
        parser.fill(&mut self.class_block)?;
        parser.fill(&mut self.type_block)?;
        parser.finish()
    }

    /// The configuration line that recreates this record.
    pub fn description(&self) -> CoreResult<String> {
        let mut tokens = vec![quote(&self.name), quote(self.type_name())];
        tokens.extend(self.class_block.description_tokens()?);
        tokens.extend(self.type_block.description_tokens()?);
        Ok(tokens.join(" "))
    }

    /// One line with the name, type and summary fields.
    pub fn summary(&self) -> CoreResult<String> {
        let mut parts = vec![self.name.clone(), self.type_name().to_string()];
        parts.extend(self.class_block.summary_pairs()?);
        parts.extend(self.type_block.summary_pairs()?);
        Ok(parts.join(" "))
    }

    /// Multi-line listing of every accessible field.
    pub fn dump(&self) -> CoreResult<String> {
        let mut lines = vec![format!(
            "Record '{}' ({} {}, driver '{}')",
            self.name,
            self.superclass(),
            self.class(),
            self.type_name()
        )];
        lines.extend(self.class_block.dump_lines()?);
        lines.extend(self.type_block.dump_lines()?);
        Ok(lines.join("\n"))
    }

    /// JSON object with identity and every accessible field.
    pub fn to_json(&self) -> CoreResult<Value> {
        let mut fields = Map::new();
        self.class_block.write_json(&mut fields)?;
        self.type_block.write_json(&mut fields)?;
        let mut object = Map::new();
        object.insert("name".into(), Value::from(self.name.clone()));
        object.insert("type".into(), Value::from(self.type_name()));
        object.insert("class".into(), Value::from(self.class().name()));
        object.insert("fields".into(), Value::Object(fields));
        Ok(Value::Object(object))
    }

    /// Whether the field would appear in dumps.
    pub fn is_accessible(&self, field: &str) -> CoreResult<bool> {
        Ok(!self.descriptor(field)?.flags.contains(FieldFlags::NO_ACCESS))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ClassOps, DriverBuilder};
    use crate::class::AnalogInputOps;
    use crate::error::ErrorKind;
    use crate::field::{SchemaBuilder, StructKind};

    struct Fixed;
    impl AnalogInputOps for Fixed {}

    fn record() -> Record {
        let schema = SchemaBuilder::new(StructKind::Type)
            .record_ref("source", FieldFlags::IN_DESCRIPTION)
            .scalar("gain", FieldType::Int32, FieldFlags::IN_DESCRIPTION)
            .build()
            .unwrap();
        let driver = DriverBuilder::new("test_ai", RecordClass::AnalogInput)
            .class_ops(ClassOps::AnalogInput(Arc::new(Fixed)))
            .type_schema(schema)
            .build()
            .unwrap();
        Record::allocate("ai1", Arc::new(driver)).unwrap()
    }

    #[test]
    fn test_fields_span_both_blocks() {
        let mut r = record();
        r.set_field("scale", 2.0).unwrap();
        r.set_field("gain", 5).unwrap();
        assert_eq!(r.get_f64("scale").unwrap(), 2.0);
        assert_eq!(r.get_i64("gain").unwrap(), 5);
        assert_eq!(
            r.set_field("value", 1.0).unwrap_err().kind(),
            ErrorKind::FieldReadOnly
        );
        assert_eq!(
            r.get_field("missing").unwrap_err().kind(),
            ErrorKind::FieldNotFound
        );
    }

    #[test]
    fn test_batch_store_restores_both_blocks_on_failure() {
        let mut r = record();
        r.store_field_texts([("scale", "3.0"), ("gain", "4")]).unwrap();
        assert_eq!(r.get_f64("scale").unwrap(), 3.0);

        let err = r
            .store_field_texts([("value", "9.5"), ("gain", "5"), ("gain", "five")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(r.get_f64("value").unwrap(), 0.0);
        assert_eq!(r.get_i64("gain").unwrap(), 4);
    }

    #[test]
    fn test_description_round_trip() {
        let mut r = record();
        let tokens: Vec<String> = ["2.5", "0.5", "\"mV\"", "other", "-3"]
            .iter()
            .map(|s| s.replace('"', ""))
            .collect();
        r.parse_description(&tokens).unwrap();

        assert_eq!(r.description().unwrap(), "ai1 test_ai 2.5 0.5 mV other -3");
        assert_eq!(
            r.record_refs().unwrap(),
            vec![("source".to_string(), "other".to_string())]
        );
        assert!(r.summary().unwrap().starts_with("ai1 test_ai value=0"));
    }

    #[test]
    fn test_runtime_slot() {
        let mut r = record();
        r.set_runtime(41u32);
        *r.runtime_mut::<u32>().unwrap() += 1;
        assert!(r.runtime::<String>().is_none());
        assert!(r.take_runtime::<String>().is_none());
        assert_eq!(r.take_runtime::<u32>(), Some(42));
        assert!(!r.has_runtime());
    }

    #[test]
    fn test_json_export() {
        let mut r = record();
        r.set_field("units", "V").unwrap();
        let json = r.to_json().unwrap();
        assert_eq!(json["class"], "analog_input");
        assert_eq!(json["fields"]["units"], "V");
        assert_eq!(json["fields"]["gain"], 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        let driver = Arc::clone(record().driver());
        assert_eq!(
            Record::allocate("", driver).unwrap_err().kind(),
            ErrorKind::NullArgument
        );
    }
}
