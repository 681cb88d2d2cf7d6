//! Process-scoped services shared by every consumer.

use std::sync::Arc;

use scan_pool::BufferPool;
use scan_source::{SourceDescriptor, SourceRegistry};
use tracing::info;

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};

/// The buffer pool and the source registry, created once at startup.
///
/// Share it as `Arc<ScanContext>`. The registry is complete when `init`
/// returns and is never mutated afterwards.
#[derive(Debug)]
pub struct ScanContext {
    pool: BufferPool,
    registry: SourceRegistry,
}

impl ScanContext {
    /// Build the pool and register the built-in source drivers.
    pub fn init(config: &ScanConfig) -> ScanResult<Arc<Self>> {
        Self::with_registry(config, SourceRegistry::with_builtin_sources()?)
    }

    /// Build the pool around a registry prepared by the caller.
    pub fn with_registry(config: &ScanConfig, registry: SourceRegistry) -> ScanResult<Arc<Self>> {
        let pool = BufferPool::new(&config.pool)?;
        info!(
            sources = registry.len(),
            min_class = config.pool.min_class,
            max_class = config.pool.max_class,
            "Scan context initialized"
        );
        Ok(Arc::new(Self { pool, registry }))
    }

    /// Shared sample buffer pool.
    #[must_use]
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Registered source drivers.
    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Look a source driver up by name.
    pub fn source(&self, name: &str) -> ScanResult<&SourceDescriptor> {
        self.registry
            .lookup_by_name(name)
            .ok_or_else(|| ScanError::UnknownSource(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_registers_builtins() {
        let ctx = ScanContext::init(&ScanConfig::default()).unwrap();
        assert_eq!(ctx.registry().len(), 4);
        assert_eq!(ctx.source("stdin").unwrap().index(), 2);
        assert!(matches!(
            ctx.source("hackrf"),
            Err(ScanError::UnknownSource(name)) if name == "hackrf"
        ));
    }

    #[test]
    fn test_init_rejects_bad_pool() {
        let mut config = ScanConfig::default();
        config.pool.min_class = 30;
        config.pool.max_class = 20;
        assert!(matches!(ScanContext::init(&config), Err(ScanError::Pool(_))));
    }
}
