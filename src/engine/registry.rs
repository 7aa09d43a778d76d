//! Driver Registry
//!
//! Central registry for all available database drivers.
//! Drivers are looked up by URI scheme, which is the config's driver
//! identifier without any `+dialect` suffix.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::config::driver_base;
use crate::engine::drivers::mysql::MySqlDriver;
use crate::engine::drivers::postgres::PostgresDriver;
use crate::engine::drivers::sqlite::SqliteDriver;
use crate::engine::drivers::Driver;
use crate::engine::error::{EngineError, EngineResult};

/// Registry that holds all available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Registry with the bundled PostgreSQL, MySQL and SQLite drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PostgresDriver::new()));
        registry.register(Arc::new(MySqlDriver::new()));
        registry.register(Arc::new(SqliteDriver::new()));
        registry
    }

    /// Registers a driver under each of its schemes
    ///
    /// A later registration for the same scheme replaces the earlier one.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        for scheme in driver.schemes() {
            self.drivers
                .insert(scheme.to_ascii_lowercase(), Arc::clone(&driver));
        }
    }

    /// Gets a driver by scheme
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Resolves a config driver identifier such as `postgresql+custom`
    pub fn resolve(&self, driver: &str) -> EngineResult<Arc<dyn Driver>> {
        self.get(driver_base(driver)).ok_or_else(|| {
            EngineError::connection_failed(format!("No driver registered for '{}'", driver))
        })
    }

    /// Lists all registered schemes
    pub fn list(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Returns the number of registered schemes
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no drivers are registered
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
