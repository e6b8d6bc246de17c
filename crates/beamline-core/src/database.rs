//! The record database.
//!
//! Records are kept in insertion order with O(1) lookup by name. Creation runs the full
//! lifecycle (`create`, `finish_init`, `open`) before a record becomes visible; a failure at
//! any step drops the partially built record and leaves the database unchanged.
//!
//! Deleting a record that other records still reference is the caller's responsibility to
//! avoid; references are by name and are not counted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverRegistry, RecordClass, RecordConfig, RecordLookup};
use crate::error::{CoreError, CoreResult, Namespace};
use crate::field::tokenize;
use crate::record::{Record, RecordHandle, RecordState};

struct Entry {
    handle: RecordHandle,
    class: RecordClass,
}

/// Insertion-ordered collection of records keyed by name.
#[derive(Default)]
pub struct RecordDatabase {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl RecordDatabase {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the database holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when a record named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Record names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// The record named `name`, if any.
    pub fn get(&self, name: &str) -> Option<RecordHandle> {
        self.entries.get(name).map(|e| Arc::clone(&e.handle))
    }

    /// The record named `name`, or [`CoreError::NotFound`].
    pub fn find(&self, name: &str) -> CoreResult<RecordHandle> {
        self.get(name)
            .ok_or_else(|| CoreError::not_found(Namespace::Record, name))
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordHandle> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|e| &e.handle))
    }

    /// Visit every record in insertion order, stopping at the first error.
    pub fn for_each<F>(&self, mut visitor: F) -> CoreResult<()>
    where
        F: FnMut(&RecordHandle) -> CoreResult<()>,
    {
        for handle in self.iter() {
            visitor(handle)?;
        }
        Ok(())
    }

    fn check_new_name(&self, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::NullArgument("record name"));
        }
        if self.contains(name) {
            return Err(CoreError::duplicate(Namespace::Record, name));
        }
        Ok(())
    }

    fn insert(&mut self, record: Record) -> RecordHandle {
        let name = record.name().to_string();
        let class = record.class();
        let handle = Arc::new(Mutex::new(record));
        self.entries.insert(
            name.clone(),
            Entry {
                handle: Arc::clone(&handle),
                class,
            },
        );
        self.order.push(name);
        handle
    }

    fn unlink(&mut self, name: &str) -> Option<RecordHandle> {
        let entry = self.entries.remove(name)?;
        self.order.retain(|n| n != name);
        Some(entry.handle)
    }

    /// Allocate a record and run its `create` hook.
    fn build(driver: Arc<Driver>, name: &str, config: &RecordConfig) -> CoreResult<Record> {
        let mut record = Record::allocate(name, Arc::clone(&driver))?;
        driver.lifecycle().create(&mut record, config)?;
        Ok(record)
    }

    fn finish_init(&self, record: &mut Record) -> CoreResult<()> {
        let driver = Arc::clone(record.driver());
        driver.lifecycle().finish_init(record, self)?;
        record.set_state(RecordState::Initialized);
        Ok(())
    }

    fn open(record: &mut Record) -> CoreResult<()> {
        let driver = Arc::clone(record.driver());
        driver.lifecycle().open(record)?;
        record.set_state(RecordState::Open);
        Ok(())
    }

    fn close(record: &mut Record) -> CoreResult<()> {
        if record.state() != RecordState::Open {
            return Ok(());
        }
        let driver = Arc::clone(record.driver());
        driver.lifecycle().close(record)?;
        record.set_state(RecordState::Closed);
        Ok(())
    }

    /// Create, initialize and open a record, then insert it.
    pub fn create(
        &mut self,
        drivers: &DriverRegistry,
        type_name: &str,
        name: &str,
        config: &RecordConfig,
    ) -> CoreResult<RecordHandle> {
        if type_name.is_empty() {
            return Err(CoreError::NullArgument("record type"));
        }
        self.check_new_name(name)?;
        let driver = drivers.resolve(type_name)?;

        let mut record = Self::build(driver, name, config)?;
        if let Err(err) = self
            .finish_init(&mut record)
            .and_then(|()| Self::open(&mut record))
        {
            Self::discard(&mut record);
            return Err(err);
        }

        let handle = self.insert(record);
        info!(record = %name, driver = %type_name, "Record created");
        Ok(handle)
    }

    /// Close the record, run its `delete` hook and unlink it.
    pub fn delete(&mut self, name: &str) -> CoreResult<()> {
        let handle = self.find(name)?;
        {
            let mut record = handle.lock();
            Self::close(&mut record)?;
            let driver = Arc::clone(record.driver());
            driver.lifecycle().delete(&mut record)?;
        }
        self.unlink(name);
        info!(record = %name, "Record deleted");
        Ok(())
    }

    /// Create every record described by `text`, one `name type args...` line per record.
    ///
    /// All records are created first, then initialized (so references may point forward),
    /// then opened. Any failure rolls back every record this call created.
    pub fn load(&mut self, drivers: &DriverRegistry, text: &str) -> CoreResult<Vec<String>> {
        let mut lines = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let tokens = tokenize(line)
                .map_err(|e| CoreError::Config(format!("line {}: {}", number + 1, e)))?;
            match tokens.as_slice() {
                [] => {}
                [name, type_name, args @ ..] => lines.push((
                    name.clone(),
                    type_name.clone(),
                    RecordConfig::from_tokens(args.iter().cloned()),
                )),
                [name] => {
                    return Err(CoreError::Config(format!(
                        "line {}: record '{}' has no type",
                        number + 1,
                        name
                    )))
                }
            }
        }

        let mut created: Vec<String> = Vec::with_capacity(lines.len());
        let result = self.load_lines(drivers, &lines, &mut created);
        if let Err(err) = result {
            warn!(error = %err, rolled_back = created.len(), "Database load failed");
            self.roll_back(&created);
            return Err(err);
        }
        info!(count = created.len(), "Database loaded");
        Ok(created)
    }

    fn load_lines(
        &mut self,
        drivers: &DriverRegistry,
        lines: &[(String, String, RecordConfig)],
        created: &mut Vec<String>,
    ) -> CoreResult<()> {
        for (name, type_name, config) in lines {
            self.check_new_name(name)?;
            let record = Self::build(drivers.resolve(type_name)?, name, config)?;
            self.insert(record);
            created.push(name.clone());
        }
        for name in created.iter() {
            let handle = self.find(name)?;
            let mut record = handle.lock();
            self.finish_init(&mut record)?;
        }
        for name in created.iter() {
            let handle = self.find(name)?;
            let mut record = handle.lock();
            Self::open(&mut record)?;
        }
        Ok(())
    }

    fn roll_back(&mut self, names: &[String]) {
        for name in names.iter().rev() {
            if let Some(handle) = self.unlink(name) {
                Self::discard(&mut handle.lock());
            }
        }
    }

    /// Close and delete a record that never became visible, logging failures.
    fn discard(record: &mut Record) {
        if let Err(err) = Self::close(record) {
            warn!(record = %record.name(), error = %err, "Close failed during rollback");
        }
        let driver = Arc::clone(record.driver());
        if let Err(err) = driver.lifecycle().delete(record) {
            warn!(record = %record.name(), error = %err, "Delete failed during rollback");
        }
    }

    /// Close and delete every record, newest first. Returns the failures; the database is
    /// empty afterwards.
    pub fn close_all(&mut self) -> Vec<CoreError> {
        let mut errors = Vec::new();
        while let Some(name) = self.order.pop() {
            let Some(entry) = self.entries.remove(&name) else {
                continue;
            };
            let mut record = entry.handle.lock();
            if let Err(err) = Self::close(&mut record) {
                warn!(record = %name, error = %err, "Record close failed");
                errors.push(err);
            }
            let driver = Arc::clone(record.driver());
            if let Err(err) = driver.lifecycle().delete(&mut record) {
                warn!(record = %name, error = %err, "Record delete failed");
                errors.push(err);
            }
            debug!(record = %name, "Record closed");
        }
        errors
    }
}

impl RecordLookup for RecordDatabase {
    fn find(&self, name: &str) -> Option<RecordHandle> {
        self.get(name)
    }

    fn class_of(&self, name: &str) -> Option<RecordClass> {
        self.entries.get(name).map(|e| e.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RecordLifecycle;
    use tracing_test::traced_test;

    struct FailingOpen;

    impl RecordLifecycle for FailingOpen {
        fn open(&self, record: &mut Record) -> CoreResult<()> {
            Err(CoreError::CorruptState(format!("{} has no device", record.name())))
        }
    }

    fn registry() -> DriverRegistry {
        let mut drivers = DriverRegistry::new();
        for driver in [
            Driver::builder("plain", RecordClass::Variable).build(),
            Driver::builder("unopenable", RecordClass::Variable)
                .lifecycle(FailingOpen)
                .build(),
        ] {
            drivers.register(driver.unwrap()).unwrap();
        }
        drivers
    }

    #[test]
    fn test_failed_open_is_not_inserted() {
        let drivers = registry();
        let mut db = RecordDatabase::new();
        let err = db
            .create(&drivers, "unopenable", "dev", &RecordConfig::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::CorruptState(_)));
        assert!(db.is_empty());
        assert!(!db.contains("dev"));
    }

    #[test]
    fn test_delete_unknown_record() {
        let mut db = RecordDatabase::new();
        let err = db.delete("ghost").unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound {
                namespace: Namespace::Record,
                ..
            }
        ));
    }

    #[traced_test]
    #[test]
    fn test_load_failure_is_logged_and_rolled_back() {
        let drivers = registry();
        let mut db = RecordDatabase::new();
        db.create(&drivers, "plain", "keep", &RecordConfig::new())
            .unwrap();

        let err = db
            .load(&drivers, "a plain\nb plain\nc unopenable\n")
            .unwrap_err();
        assert!(matches!(err, CoreError::CorruptState(_)));
        assert_eq!(db.names(), ["keep"]);
        assert!(logs_contain("Database load failed"));
    }

    #[test]
    fn test_lookup_reports_class_without_locking() {
        let drivers = registry();
        let mut db = RecordDatabase::new();
        let handle = db
            .create(&drivers, "plain", "v", &RecordConfig::new())
            .unwrap();
        let _guard = handle.lock();
        assert_eq!(RecordLookup::class_of(&db, "v"), Some(RecordClass::Variable));
        assert!(RecordLookup::contains(&db, "v"));
        assert!(!RecordLookup::contains(&db, "w"));
    }
}
