//! The registry type to adapter constructor table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use registry_model::{AdapterInfo, Registry, RegistryType};

use crate::adapter::Adapter;
use crate::error::{AdapterError, AdapterErrorKind};

/// Builds adapters for one registry type.
pub trait AdapterFactory: fmt::Debug + Send + Sync {
    /// The capability descriptor shared by every adapter this factory builds.
    fn info(&self) -> AdapterInfo;

    /// Validate `registry` and bind an adapter to it. No network I/O happens here.
    fn create(&self, registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError>;
}

/// Maps registry types to their factories.
///
/// Registration normally happens once at start-up, and lookups afterwards.
/// The table is behind a read-write lock, so late registration is also safe.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: RwLock<HashMap<RegistryType, Arc<dyn AdapterFactory>>>,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

static GLOBAL: OnceLock<FactoryRegistry> = OnceLock::new();

impl FactoryRegistry {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table.
    pub fn global() -> &'static FactoryRegistry {
        GLOBAL.get_or_init(FactoryRegistry::new)
    }

    /// Register `factory` under the registry type its info reports.
    ///
    /// A second factory for the same type is rejected.
    pub fn register<F>(&self, factory: F) -> Result<(), AdapterError>
    where
        F: AdapterFactory + 'static,
    {
        let kind = factory.info().registry_type;
        let mut factories = self.factories.write();

        if factories.contains_key(&kind) {
            return Err(AdapterError::new(
                "factory",
                AdapterErrorKind::InvalidConfig,
                format!("a factory for {kind} is already registered"),
            ));
        }

        tracing::debug!(%kind, "registering adapter factory");
        factories.insert(kind, Arc::new(factory));
        Ok(())
    }

    /// Look up the factory for `kind`.
    pub fn get(&self, kind: RegistryType) -> Result<Arc<dyn AdapterFactory>, AdapterError> {
        self.factories.read().get(&kind).cloned().ok_or_else(|| {
            AdapterError::new(
                "factory",
                AdapterErrorKind::NotFound,
                format!("no adapter factory registered for {kind}"),
            )
        })
    }

    /// Look up a factory by its persisted registry type key.
    pub fn get_by_key(&self, key: &str) -> Result<Arc<dyn AdapterFactory>, AdapterError> {
        let kind = key
            .parse()
            .map_err(AdapterError::with("factory", AdapterErrorKind::NotFound))?;
        self.get(kind)
    }

    /// Bind an adapter to `registry` with the factory for its type.
    pub fn create(&self, registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError> {
        self.get(registry.kind)?.create(registry)
    }

    /// Registered registry types, in a stable order.
    pub fn registered_types(&self) -> Vec<RegistryType> {
        let mut types: Vec<_> = self.factories.read().keys().copied().collect();
        types.sort();
        types
    }

    /// Capability descriptors of every registered factory, in a stable order.
    pub fn adapter_infos(&self) -> Vec<AdapterInfo> {
        let mut infos: Vec<_> = self
            .factories
            .read()
            .values()
            .map(|factory| factory.info())
            .collect();
        infos.sort_by_key(|info| info.registry_type);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_model::{PathComponentType, ResourceType};

    #[derive(Debug)]
    struct Unbuildable(RegistryType);

    impl AdapterFactory for Unbuildable {
        fn info(&self) -> AdapterInfo {
            AdapterInfo {
                registry_type: self.0,
                description: String::new(),
                supported_resource_types: vec![ResourceType::Image],
                supported_resource_filters: Vec::new(),
                supported_triggers: Vec::new(),
                supported_repository_path_component_type: PathComponentType::Flexible,
            }
        }

        fn create(&self, _registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError> {
            Err(AdapterError::new(
                "unbuildable",
                AdapterErrorKind::InvalidConfig,
                "never builds",
            ))
        }
    }

    static_assertions::assert_impl_all!(FactoryRegistry: Send, Sync);

    #[test]
    fn lookup() {
        let table = FactoryRegistry::new();
        table.register(Unbuildable(RegistryType::Harbor)).unwrap();
        table.register(Unbuildable(RegistryType::DockerHub)).unwrap();

        assert_eq!(
            table.registered_types(),
            vec![RegistryType::DockerHub, RegistryType::Harbor]
        );
        assert_eq!(table.adapter_infos().len(), 2);
        assert!(table.get(RegistryType::Harbor).is_ok());
        assert!(table.get_by_key("harbor").is_ok());

        let error = table.get(RegistryType::Generic).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::NotFound);

        let error = table.get_by_key("quay").unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::NotFound);
    }

    #[test]
    fn duplicate_registration() {
        let table = FactoryRegistry::new();
        table.register(Unbuildable(RegistryType::Harbor)).unwrap();
        let error = table.register(Unbuildable(RegistryType::Harbor)).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);
    }

    #[test]
    fn create_uses_descriptor_type() {
        let table = FactoryRegistry::new();
        table.register(Unbuildable(RegistryType::Harbor)).unwrap();

        let harbor = Registry::new(RegistryType::Harbor, "https://harbor.example.com");
        assert_eq!(
            table.create(&harbor).unwrap_err().kind(),
            AdapterErrorKind::InvalidConfig
        );

        let generic = Registry::new(RegistryType::Generic, "https://registry.example.com");
        assert_eq!(
            table.create(&generic).unwrap_err().kind(),
            AdapterErrorKind::NotFound
        );
    }
}
