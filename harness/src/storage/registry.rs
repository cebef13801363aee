//! Backend construction keyed by type tag

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FactoryError, HarnessError, Result};
use crate::params::ParamMap;
use crate::storage::{MemoryStoreBuilder, Storage};

type BackendBuilder = Box<dyn Fn(&ParamMap) -> Result<Arc<dyn Storage>> + Send + Sync>;

/// Maps backend type tags to adapter constructors.
///
/// Tags are matched case-insensitively. Unknown tags are rejected before
/// any work begins.
pub struct BackendRegistry {
    builders: BTreeMap<String, BackendBuilder>,
}

impl BackendRegistry {
    /// Empty registry; see [`BackendRegistry::default`] for the built-ins.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, tag: &str, builder: F)
    where
        F: Fn(&ParamMap) -> Result<Arc<dyn Storage>> + Send + Sync + 'static,
    {
        self.builders.insert(tag.to_lowercase(), Box::new(builder));
    }

    /// Construct an uninitialized backend for `tag` from its configuration.
    pub fn create(&self, tag: &str, config: &ParamMap) -> Result<Arc<dyn Storage>> {
        let builder = self.builders.get(&tag.to_lowercase()).ok_or_else(|| {
            HarnessError::from(FactoryError::UnsupportedBackend {
                name: tag.to_string(),
            })
        })?;
        builder(config)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.builders.contains_key(&tag.to_lowercase())
    }

    pub fn tags(&self) -> Vec<String> {
        self.builders.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", |config| {
            let store = MemoryStoreBuilder::from_params(config)?.build();
            Ok(Arc::new(store) as Arc<dyn Storage>)
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_registered() {
        let registry = BackendRegistry::default();
        assert!(registry.contains("Memory"));
        let backend = registry.create("memory", &ParamMap::new()).unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let registry = BackendRegistry::default();
        let err = registry.create("cassandra", &ParamMap::new()).err().unwrap();
        assert!(matches!(
            err,
            HarnessError::Factory(FactoryError::UnsupportedBackend { ref name }) if name == "cassandra"
        ));
    }

    #[test]
    fn test_invalid_backend_config() {
        let registry = BackendRegistry::default();
        let config = crate::params! { "latencyMs" => -1.0 };
        assert!(matches!(
            registry.create("memory", &config),
            Err(HarnessError::Storage(_))
        ));
    }
}
