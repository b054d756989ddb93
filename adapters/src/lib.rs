//! # Built-in adapters
//!
//! Registers the adapters compiled into this build with a [FactoryRegistry],
//! and binds adapters to registry descriptors. Each adapter sits behind a
//! cargo feature of the same name, all enabled by default.
//!
//! ```rust,no_run
//! use registry_adapter::CancellationToken;
//! use registry_model::{Filter, Registry, RegistryType};
//!
//! # async fn demo() -> Result<(), registry_adapter::AdapterError> {
//! let registry = Registry::new(RegistryType::Harbor, "https://harbor.example.com");
//! let adapter = adapters::connect(&registry)?;
//! let resources = adapter
//!     .fetch_artifacts(&[Filter::name("library/**")], &CancellationToken::new())
//!     .await?;
//! # let _ = resources;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Once};

use registry_adapter::{
    Adapter, AdapterError, AdapterErrorKind, AdapterFactory, AdapterOptions, FactoryRegistry,
};
use registry_model::{Registry, RegistryType};

#[cfg(feature = "distribution")]
#[doc(inline)]
pub use distribution::{DistributionAdapter, DistributionFactory};
#[cfg(feature = "dockerhub")]
#[doc(inline)]
pub use dockerhub::{DockerHubAdapter, DockerHubFactory};
#[cfg(feature = "harbor")]
#[doc(inline)]
pub use harbor::{HarborAdapter, HarborFactory};

fn register_missing<F>(
    table: &FactoryRegistry,
    registered: &mut Vec<RegistryType>,
    factory: F,
) -> Result<(), AdapterError>
where
    F: AdapterFactory + 'static,
{
    let kind = factory.info().registry_type;
    if table.get(kind).is_ok() {
        tracing::debug!(%kind, "factory already registered, keeping it");
        return Ok(());
    }

    table.register(factory)?;
    registered.push(kind);
    Ok(())
}

/// Register every built-in factory whose registry type has no factory yet.
///
/// Returns the types this call registered. Factories registered earlier are
/// left in place, so calling this twice is harmless.
pub fn register_builtin(
    table: &FactoryRegistry,
    options: &AdapterOptions,
) -> Result<Vec<RegistryType>, AdapterError> {
    options.validate()?;
    let mut registered = Vec::new();

    #[cfg(feature = "dockerhub")]
    register_missing(table, &mut registered, DockerHubFactory::new(options.clone()))?;
    #[cfg(feature = "harbor")]
    register_missing(table, &mut registered, HarborFactory::new(options.clone()))?;
    #[cfg(feature = "distribution")]
    register_missing(table, &mut registered, DistributionFactory::new(options.clone()))?;

    Ok(registered)
}

static INIT: Once = Once::new();

/// Populate [FactoryRegistry::global] with the built-in factories, once.
pub fn init() {
    INIT.call_once(|| {
        match register_builtin(FactoryRegistry::global(), &AdapterOptions::default()) {
            Ok(types) => tracing::debug!(?types, "registered built-in adapters"),
            Err(error) => tracing::error!(%error, "registering built-in adapters"),
        }
    });
}

/// Bind an adapter to `registry` through the process-wide table.
pub fn connect(registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError> {
    init();
    FactoryRegistry::global().create(registry)
}

/// Bind a built-in adapter to `registry` with `options`, bypassing any table.
pub fn connect_with(
    registry: &Registry,
    options: AdapterOptions,
) -> Result<Arc<dyn Adapter>, AdapterError> {
    match registry.kind {
        #[cfg(feature = "dockerhub")]
        RegistryType::DockerHub => Ok(Arc::new(DockerHubAdapter::new(registry, options)?)),
        #[cfg(feature = "harbor")]
        RegistryType::Harbor => Ok(Arc::new(HarborAdapter::new(registry, options)?)),
        #[cfg(feature = "distribution")]
        RegistryType::Generic => Ok(Arc::new(DistributionAdapter::new(registry, options)?)),
        #[allow(unreachable_patterns)]
        kind => {
            let _ = options;
            Err(AdapterError::new(
                "adapters",
                AdapterErrorKind::NotFound,
                format!("no built-in adapter for {kind}"),
            ))
        }
    }
}

#[cfg(all(test, feature = "dockerhub", feature = "harbor", feature = "distribution"))]
mod tests {
    use super::*;
    use registry_model::{Credential, CredentialType, PathComponentType};

    #[test]
    fn registers_every_builtin_once() {
        let table = FactoryRegistry::new();
        let registered = register_builtin(&table, &AdapterOptions::default()).unwrap();
        assert_eq!(registered.len(), 3);
        assert_eq!(
            table.registered_types(),
            vec![RegistryType::DockerHub, RegistryType::Harbor, RegistryType::Generic]
        );

        let again = register_builtin(&table, &AdapterOptions::default()).unwrap();
        assert!(again.is_empty());

        let infos = table.adapter_infos();
        let hub = infos
            .iter()
            .find(|info| info.registry_type == RegistryType::DockerHub)
            .unwrap();
        assert_eq!(
            hub.supported_repository_path_component_type,
            PathComponentType::OnlyTwo
        );
        assert!(infos
            .iter()
            .filter(|info| info.registry_type != RegistryType::DockerHub)
            .all(|info| info.supported_repository_path_component_type
                == PathComponentType::Flexible));
    }

    #[test]
    fn bad_options_register_nothing() {
        let table = FactoryRegistry::new();
        let options = AdapterOptions {
            page_size: 0,
            ..Default::default()
        };
        let error = register_builtin(&table, &options).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);
        assert!(table.registered_types().is_empty());
    }

    #[test]
    fn connect_by_descriptor() {
        let registry = Registry::new(RegistryType::Harbor, "https://harbor.example.com")
            .with_credential(Credential::basic("admin", "Harbor12345"));
        let adapter = connect(&registry).unwrap();
        assert_eq!(adapter.info().unwrap().registry_type, RegistryType::Harbor);
        assert_eq!(adapter.registry().url, "https://harbor.example.com");

        assert!(FactoryRegistry::global().get_by_key("generic").is_ok());
        assert!(FactoryRegistry::global().get_by_key("docker-hub").is_ok());
    }

    #[test]
    fn connect_rejects_bad_descriptors() {
        let registry = Registry::new(RegistryType::DockerHub, "https://hub.docker.com")
            .with_credential(Credential::new(CredentialType::Secret, "", "shh"));
        let error = connect(&registry).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);

        let registry = Registry::new(RegistryType::Generic, "registry.local:5000");
        let error = connect_with(&registry, AdapterOptions::default()).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);
    }
}
