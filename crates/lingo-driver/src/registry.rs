//! Resolution of driver names to driver instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::array::ArrayTranslationDriver;
use crate::config::TranslationConfig;
use crate::contract::{Operation, TranslationDriver};
use crate::error::{DriverError, DriverResult, RegistryError, RegistryResult};
use crate::json::JsonTranslationDriver;

/// Builds a driver from the registry's configuration.
pub type DriverFactory =
    Box<dyn Fn(&TranslationConfig) -> DriverResult<Arc<dyn TranslationDriver>> + Send + Sync>;

/// Names of the drivers every registry can build.
pub const BUILTIN_DRIVERS: [&str; 2] = ["json", "array"];

/// Resolves driver names to shared driver instances.
///
/// Built-in drivers are `json` and `array`; [`Self::extend`] registers more
/// (or replaces a built-in). Every resolved driver is checked against the
/// full [`Operation`] contract before it is handed out, and cached so later
/// lookups of the same name share one instance.
pub struct DriverRegistry {
    config: TranslationConfig,
    default_driver: Option<String>,
    extensions: BTreeMap<String, DriverFactory>,
    resolved: Mutex<HashMap<String, Arc<dyn TranslationDriver>>>,
}

impl DriverRegistry {
    pub fn new(config: TranslationConfig) -> Self {
        Self {
            config,
            default_driver: None,
            extensions: BTreeMap::new(),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// Register `factory` under `name`, replacing any driver of that name.
    pub fn extend<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&TranslationConfig) -> DriverResult<Arc<dyn TranslationDriver>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.forget(&name);
        debug!(driver = %name, "registered driver extension");
        self.extensions.insert(name, Box::new(factory));
        self
    }

    /// Resolve `name`, or the default driver when `None`.
    pub fn driver(&self, name: Option<&str>) -> RegistryResult<Arc<dyn TranslationDriver>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_driver()?,
        };

        // Held across creation so one name is only ever built once.
        let mut resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(driver) = resolved.get(&name) {
            return Ok(driver.clone());
        }

        let driver = self.create(&name)?;
        check_contract(&name, driver.as_ref())?;

        resolved.insert(name.clone(), driver.clone());
        info!(driver = %name, "resolved translation driver");
        Ok(driver)
    }

    /// Name of the default driver: the runtime override if set, else the
    /// configured one.
    pub fn default_driver(&self) -> RegistryResult<String> {
        self.default_driver
            .clone()
            .or_else(|| self.config.default_driver().map(str::to_string))
            .ok_or(RegistryError::NoDefaultDriver)
    }

    /// Override the default driver for this registry.
    pub fn set_default_driver(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_driver = Some(name.into());
        self
    }

    /// Swap the default driver for a fresh in-memory one and return it, so
    /// tests can make assertions against what was written.
    pub fn fake(&mut self) -> Arc<ArrayTranslationDriver> {
        let fake = Arc::new(ArrayTranslationDriver::new());
        let mut resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
        resolved.insert("array".to_string(), fake.clone());
        drop(resolved);
        self.default_driver = Some("array".to_string());
        fake
    }

    /// Built-in driver names followed by extension names.
    pub fn available_drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_DRIVERS.iter().map(|n| n.to_string()).collect();
        for name in self.extensions.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Names registered through [`Self::extend`], sorted.
    pub fn extension_names(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }

    fn forget(&self, name: &str) {
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.remove(name);
        }
    }

    fn create(&self, name: &str) -> RegistryResult<Arc<dyn TranslationDriver>> {
        let created = if let Some(factory) = self.extensions.get(name) {
            factory(&self.config)
        } else {
            match name {
                "json" => create_json(&self.config),
                "array" => Ok(Arc::new(ArrayTranslationDriver::new()) as Arc<dyn TranslationDriver>),
                _ => return Err(RegistryError::UnknownDriver(name.to_string())),
            }
        };
        created.map_err(|source| RegistryError::Create {
            driver: name.to_string(),
            source,
        })
    }
}

/// Open the JSON driver, spawning its sync worker on the current runtime
/// when the configured queue has one.
fn create_json(config: &TranslationConfig) -> DriverResult<Arc<dyn TranslationDriver>> {
    let (driver, worker) = JsonTranslationDriver::open(config)?;
    if let Some(worker) = worker {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| DriverError::NoRuntime(driver.queue_kind()))?;
        handle.spawn(worker.run());
    }
    Ok(Arc::new(driver))
}

fn check_contract(name: &str, driver: &dyn TranslationDriver) -> RegistryResult<()> {
    let implemented = driver.operations();
    let missing: Vec<Operation> = Operation::ALL
        .iter()
        .copied()
        .filter(|op| !implemented.contains(op))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    warn!(driver = name, missing = missing.len(), "driver rejected: incomplete contract");
    Err(RegistryError::IncompleteContract {
        driver: name.to_string(),
        missing,
    })
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("default_driver", &self.default_driver)
            .field("extensions", &self.extension_names())
            .finish_non_exhaustive()
    }
}
