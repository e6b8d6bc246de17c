//! Extensions: named capabilities outside the driver namespace, such as scripting
//! front-ends.
//!
//! One registered extension may be selected as the default script handler. The slot is
//! last-writer-wins and is cleared when that extension is unregistered.

use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult, Namespace};

/// An independently loaded capability.
pub trait Extension: Send {
    fn name(&self) -> &str;

    /// Called once, right after registration.
    fn initialize(&mut self) -> CoreResult<()> {
        Ok(())
    }

    /// Called once before the extension is dropped.
    fn finalize(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn call(&mut self, _args: &[String]) -> CoreResult<String> {
        Err(CoreError::UnsupportedOperation {
            target: format!("extension '{}'", self.name()),
            operation: "call",
        })
    }

    fn call_string(&mut self, _text: &str) -> CoreResult<String> {
        Err(CoreError::UnsupportedOperation {
            target: format!("extension '{}'", self.name()),
            operation: "call_string",
        })
    }
}

/// Registered extensions in registration order.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
    default_script_handler: Option<String>,
}

impl ExtensionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.extensions.iter().position(|e| e.name() == name)
    }

    fn get_mut(&mut self, name: &str) -> CoreResult<&mut Box<dyn Extension>> {
        let index = self
            .position(name)
            .ok_or_else(|| CoreError::not_found(Namespace::Extension, name))?;
        Ok(&mut self.extensions[index])
    }

    /// Register without initializing.
    pub fn register(&mut self, extension: Box<dyn Extension>) -> CoreResult<()> {
        let name = extension.name().to_string();
        if name.is_empty() {
            return Err(CoreError::NullArgument("extension name"));
        }
        if self.contains(&name) {
            return Err(CoreError::duplicate(Namespace::Extension, name));
        }
        self.extensions.push(extension);
        debug!(extension = %name, "Registered extension");
        Ok(())
    }

    /// Register and immediately initialize. A failing `initialize` unregisters the
    /// extension again.
    pub fn register_and_initialize(&mut self, extension: Box<dyn Extension>) -> CoreResult<()> {
        let name = extension.name().to_string();
        self.register(extension)?;
        if let Err(err) = self.get_mut(&name)?.initialize() {
            warn!(extension = %name, error = %err, "Extension initialization failed");
            self.unregister(&name);
            return Err(err);
        }
        info!(extension = %name, "Extension initialized");
        Ok(())
    }

    /// Remove an extension without finalizing it.
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Extension>> {
        let index = self.position(name)?;
        if self.default_script_handler.as_deref() == Some(name) {
            self.default_script_handler = None;
        }
        Some(self.extensions.remove(index))
    }

    /// Finalize and remove an extension.
    pub fn finalize_and_remove(&mut self, name: &str) -> CoreResult<()> {
        let mut extension = self
            .unregister(name)
            .ok_or_else(|| CoreError::not_found(Namespace::Extension, name))?;
        extension.finalize()
    }

    /// True when an extension named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.extensions.iter().map(|e| e.name().to_string()).collect()
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// True when no extension is registered.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Call the named extension with an argument list.
    pub fn call(&mut self, name: &str, args: &[String]) -> CoreResult<String> {
        self.get_mut(name)?.call(args)
    }

    /// Call the named extension with one string.
    pub fn call_string(&mut self, name: &str, text: &str) -> CoreResult<String> {
        self.get_mut(name)?.call_string(text)
    }

    /// Select the default script handler, replacing any previous choice.
    pub fn set_default_script_handler(&mut self, name: &str) -> CoreResult<()> {
        if !self.contains(name) {
            return Err(CoreError::not_found(Namespace::Extension, name));
        }
        if let Some(previous) = self.default_script_handler.replace(name.to_string()) {
            debug!(previous = %previous, extension = %name, "Default script handler replaced");
        }
        Ok(())
    }

    /// Stop routing scripts. Returns the previous handler's name.
    pub fn clear_default_script_handler(&mut self) -> Option<String> {
        self.default_script_handler.take()
    }

    /// Name of the extension scripts are routed to.
    pub fn default_script_handler(&self) -> Option<&str> {
        self.default_script_handler.as_deref()
    }

    /// Run `text` through the default script handler's `call_string`.
    pub fn call_default_script(&mut self, text: &str) -> CoreResult<String> {
        let name = self
            .default_script_handler
            .clone()
            .ok_or_else(|| CoreError::not_found(Namespace::Extension, "<default script handler>"))?;
        self.call_string(&name, text)
    }

    /// Finalize and drop every extension, newest first. Returns the failures.
    pub fn finalize_all(&mut self) -> Vec<CoreError> {
        self.default_script_handler = None;
        let mut errors = Vec::new();
        while let Some(mut extension) = self.extensions.pop() {
            if let Err(err) = extension.finalize() {
                warn!(extension = %extension.name(), error = %err, "Extension finalize failed");
                errors.push(err);
            }
        }
        errors
    }
}
