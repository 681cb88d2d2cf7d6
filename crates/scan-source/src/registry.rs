//! Source type registry.
//!
//! Maps a sequential index and a unique name to each registered driver.
//! Indices are assigned in registration order starting at 0 and never reused.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::drivers::{FileDriver, RadioDriver, StdinDriver, ToneGenDriver};
use crate::{RegistryError, Result, SampleSource, SourceCapabilities, SourceDriver, SourceParams};

/// A registered driver together with its assigned index. Immutable.
#[derive(Clone)]
pub struct SourceDescriptor {
    index: usize,
    driver: Arc<dyn SourceDriver>,
}

impl SourceDescriptor {
    /// Index assigned at registration.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Unique driver name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    /// One-line description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        self.driver.description()
    }

    /// Capability flags.
    #[must_use]
    pub fn capabilities(&self) -> SourceCapabilities {
        self.driver.capabilities()
    }

    /// The driver itself.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn SourceDriver> {
        &self.driver
    }

    /// Open a stream through this descriptor's driver.
    pub fn open(&self, params: &SourceParams) -> Result<Box<dyn SampleSource>> {
        debug!(index = self.index, name = self.name(), "Opening source");
        self.driver.open(params)
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Catalog of source drivers, keyed by index and by name.
#[derive(Default)]
pub struct SourceRegistry {
    by_index: BTreeMap<usize, SourceDescriptor>,
    by_name: HashMap<&'static str, usize>,
    next_index: usize,
}

impl SourceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in drivers, in this order:
    /// `file` (0), `radio` (1), `stdin` (2), `tonegen` (3).
    pub fn with_builtin_sources() -> std::result::Result<Self, RegistryError> {
        let mut registry = Self::new();
        let builtins: [Arc<dyn SourceDriver>; 4] = [
            Arc::new(FileDriver),
            Arc::new(RadioDriver),
            Arc::new(StdinDriver),
            Arc::new(ToneGenDriver),
        ];
        for driver in builtins {
            registry.register(driver)?;
        }
        Ok(registry)
    }

    /// Register a driver under the next sequential index.
    ///
    /// On error nothing is inserted and the next index does not advance.
    pub fn register(
        &mut self,
        driver: Arc<dyn SourceDriver>,
    ) -> std::result::Result<usize, RegistryError> {
        let index = self.next_index;
        let name = driver.name();

        if self.by_index.contains_key(&index) {
            return Err(RegistryError::DuplicateIndex(index));
        }
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        self.by_index.insert(index, SourceDescriptor { index, driver });
        self.by_name.insert(name, index);
        self.next_index += 1;

        info!(index, name, "Source driver registered");
        Ok(index)
    }

    /// Descriptor registered at `index`.
    #[must_use]
    pub fn lookup_by_index(&self, index: usize) -> Option<&SourceDescriptor> {
        self.by_index.get(&index)
    }

    /// Descriptor registered under `name`.
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<&SourceDescriptor> {
        self.by_name
            .get(name)
            .and_then(|index| self.by_index.get(index))
    }

    /// Visit every descriptor once, in index order, stopping at the first error.
    pub fn walk<E>(
        &self,
        mut visitor: impl FnMut(&SourceDescriptor) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        self.by_index.values().try_for_each(|d| visitor(d))
    }

    /// Descriptors in index order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.by_index.values()
    }

    /// Number of registered drivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.by_index.values()).finish()
    }
}
