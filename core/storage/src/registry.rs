//! Driver registry for dynamic backend resolution.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use stratus_common::{Error, Result};

use crate::driver::Driver;
use crate::local::{LocalConfig, LocalDriver};
use crate::memory::MemoryDriver;

/// Factory function type for creating drivers.
pub type DriverFactory = Box<dyn Fn(Value) -> Result<Arc<dyn Driver>> + Send + Sync>;

/// Registry for storage driver factories.
///
/// Allows dynamic registration and resolution of storage backends by name
/// and configuration.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory.
    ///
    /// # Preconditions
    /// - `name` must be unique within the registry
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Driver '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a driver by name and configuration.
    ///
    /// # Errors
    /// - Driver not found
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn Driver>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("driver '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered driver names.
    pub fn drivers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a driver is registered.
    pub fn has_driver(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in drivers.
pub fn create_default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();

    // Register memory driver (for testing)
    registry
        .register(
            "memory",
            Box::new(|_config| Ok(Arc::new(MemoryDriver::new()) as Arc<dyn Driver>)),
        )
        .expect("Failed to register memory driver");

    // Register local filesystem driver
    registry
        .register(
            "local",
            Box::new(|config| {
                let config: LocalConfig = serde_json::from_value(config).map_err(|e| {
                    Error::InvalidInput(format!("Invalid local driver configuration: {}", e))
                })?;
                Ok(Arc::new(LocalDriver::new(config)?) as Arc<dyn Driver>)
            }),
        )
        .expect("Failed to register local driver");

    registry
}
