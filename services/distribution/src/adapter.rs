use std::sync::Arc;

use api_client::{ApiClient, CredentialAuth};
use http::{StatusCode, Uri};
use registry_adapter::validate::validate_registry;
use registry_adapter::{
    ensure_active, health_from, Adapter, AdapterError, AdapterErrorKind, AdapterFactory,
    AdapterOptions, CancellationToken, FilterSet,
};
use registry_model::{
    AdapterInfo, CredentialType, Filter, FilterType, HealthStatus, PathComponentType, Registry,
    RegistryType, Repository, Resource, ResourceType, TriggerType,
};

use crate::client::DistributionClient;
use crate::DISTRIBUTION;

const CREDENTIALS: &[CredentialType] = &[CredentialType::Basic, CredentialType::OAuth];

/// Adapter for any registry implementing the distribution `/v2/` API.
#[derive(Debug)]
pub struct DistributionAdapter {
    registry: Registry,
    client: DistributionClient,
}

fn prepare(
    registry: &Registry,
    options: &AdapterOptions,
) -> Result<(Uri, CredentialAuth), AdapterError> {
    options.validate()?;
    let base = validate_registry(DISTRIBUTION, registry, RegistryType::Generic, CREDENTIALS)?;
    let auth = CredentialAuth::from_credential(registry.effective_credential(), "Bearer");
    Ok((base, auth))
}

impl DistributionAdapter {
    /// Bind an adapter to `registry`.
    pub fn new(registry: &Registry, options: AdapterOptions) -> Result<Self, AdapterError> {
        let (base, auth) = prepare(registry, &options)?;
        Ok(Self {
            registry: registry.clone(),
            client: DistributionClient::new(ApiClient::new(base, auth), options),
        })
    }

    /// Bind an adapter to `registry`, sending requests through `service`.
    pub fn with_service<S>(
        registry: &Registry,
        options: AdapterOptions,
        service: S,
    ) -> Result<Self, AdapterError>
    where
        S: tower::Service<
                http::Request<hyperdriver::Body>,
                Response = http::Response<hyperdriver::Body>,
                Error = hyperdriver::client::Error,
            > + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let (base, auth) = prepare(registry, &options)?;
        Ok(Self {
            registry: registry.clone(),
            client: DistributionClient::new(
                ApiClient::new_with_inner_service(base, auth, service),
                options,
            ),
        })
    }

    /// What every distribution adapter can do.
    pub fn capabilities() -> AdapterInfo {
        AdapterInfo {
            registry_type: RegistryType::Generic,
            description: "Registry implementing the distribution API".into(),
            supported_resource_types: vec![ResourceType::Image],
            supported_resource_filters: vec![FilterType::Name, FilterType::Tag],
            supported_triggers: vec![TriggerType::Manual, TriggerType::Scheduled],
            supported_repository_path_component_type: PathComponentType::Flexible,
        }
    }

    fn source(&self) -> Registry {
        Registry {
            credential: None,
            ..self.registry.clone()
        }
    }
}

#[async_trait::async_trait]
impl Adapter for DistributionAdapter {
    fn info(&self) -> Result<AdapterInfo, AdapterError> {
        Ok(Self::capabilities())
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    #[tracing::instrument(skip(self, filters, cancel), fields(adapter = DISTRIBUTION, url = %self.registry.url))]
    async fn fetch_artifacts(
        &self,
        filters: &[Filter],
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, AdapterError> {
        let filters = FilterSet::new(filters)?;
        if !filters.admits_any(&Self::capabilities()) {
            tracing::debug!("resource type filters exclude images");
            return Ok(Vec::new());
        }
        ensure_active(DISTRIBUTION, cancel)?;

        let exact = filters.exact_repository();
        let names = match exact {
            Some(name) => vec![name.to_owned()],
            None => self
                .client
                .catalog(cancel)
                .await?
                .into_iter()
                .filter(|name| filters.matches_repository(name))
                .collect(),
        };

        let mut resources = Vec::new();
        for name in names {
            let artifacts = match self.client.artifacts(&name, cancel).await {
                Ok(artifacts) => artifacts,
                Err(error) if exact.is_some() && error.status() == Some(StatusCode::NOT_FOUND) => {
                    tracing::debug!(repository = %name, "repository does not exist");
                    continue;
                }
                Err(error) => return Err(error),
            };

            let artifacts = filters.select(artifacts);
            if artifacts.is_empty() {
                continue;
            }

            resources.push(
                Resource::new(ResourceType::Image, Repository::new(name), artifacts)
                    .with_registry(self.source()),
            );
        }

        Ok(resources)
    }

    /// Always fails with [AdapterErrorKind::Unsupported], without a request.
    ///
    /// The distribution API only deletes manifests by digest, which removes
    /// every tag pointing at that manifest.
    async fn delete_tag(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError> {
        ensure_active(DISTRIBUTION, cancel)?;
        tracing::warn!(%repository, %tag, "tag deletion is not supported by the distribution API");
        Err(AdapterError::builder(
            DISTRIBUTION,
            AdapterErrorKind::Unsupported,
            format!("cannot delete only the tag {tag} of {repository}"),
        )
        .url(self.registry.url.clone())
        .build())
    }

    #[tracing::instrument(skip(self, cancel), fields(adapter = DISTRIBUTION, url = %self.registry.url))]
    async fn health_check(&self, cancel: &CancellationToken) -> Result<HealthStatus, AdapterError> {
        ensure_active(DISTRIBUTION, cancel)?;
        health_from(self.client.ping(cancel).await)
    }
}

/// Builds [DistributionAdapter]s.
#[derive(Debug, Clone, Default)]
pub struct DistributionFactory {
    options: AdapterOptions,
}

impl DistributionFactory {
    /// A factory whose adapters use `options`.
    pub fn new(options: AdapterOptions) -> Self {
        Self { options }
    }
}

impl AdapterFactory for DistributionFactory {
    fn info(&self) -> AdapterInfo {
        DistributionAdapter::capabilities()
    }

    fn create(&self, registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError> {
        Ok(Arc::new(DistributionAdapter::new(
            registry,
            self.options.clone(),
        )?))
    }
}
