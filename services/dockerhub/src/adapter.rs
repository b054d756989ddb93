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

use crate::client::{split_repository, HubClient};
use crate::DOCKER_HUB;

/// Adapter for Docker Hub.
///
/// Docker Hub addresses repositories as `namespace/name`. Single segment
/// names live in `library`, and deeper names can't exist.
#[derive(Debug)]
pub struct DockerHubAdapter {
    registry: Registry,
    client: HubClient,
}

fn prepare(registry: &Registry, options: &AdapterOptions) -> Result<Uri, AdapterError> {
    options.validate()?;
    validate_registry(
        DOCKER_HUB,
        registry,
        RegistryType::DockerHub,
        &[CredentialType::Basic],
    )
}

impl DockerHubAdapter {
    /// Bind an adapter to `registry`.
    pub fn new(registry: &Registry, options: AdapterOptions) -> Result<Self, AdapterError> {
        let base = prepare(registry, &options)?;
        let inner = ApiClient::new(base, CredentialAuth::Anonymous);
        Ok(Self::bind(registry, inner, options))
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
        let base = prepare(registry, &options)?;
        let inner = ApiClient::new_with_inner_service(base, CredentialAuth::Anonymous, service);
        Ok(Self::bind(registry, inner, options))
    }

    fn bind(registry: &Registry, inner: ApiClient<CredentialAuth>, options: AdapterOptions) -> Self {
        Self {
            registry: registry.clone(),
            client: HubClient::new(inner, registry.effective_credential().cloned(), options),
        }
    }

    /// What every Docker Hub adapter can do.
    pub fn capabilities() -> AdapterInfo {
        AdapterInfo {
            registry_type: RegistryType::DockerHub,
            description: "Docker Hub".into(),
            supported_resource_types: vec![ResourceType::Image],
            supported_resource_filters: vec![FilterType::Name, FilterType::Tag],
            supported_triggers: vec![TriggerType::Manual, TriggerType::Scheduled],
            supported_repository_path_component_type: PathComponentType::OnlyTwo,
        }
    }

    fn source(&self) -> Registry {
        Registry {
            credential: None,
            ..self.registry.clone()
        }
    }

    /// Namespaces worth listing for these filters.
    async fn candidate_namespaces(
        &self,
        filters: &FilterSet,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AdapterError> {
        if let Some(namespace) = filters.namespace() {
            return Ok(vec![namespace.to_owned()]);
        }

        if self.client.has_credential() {
            return self.client.namespaces(cancel).await;
        }

        Err(AdapterError::new(
            DOCKER_HUB,
            AdapterErrorKind::BadPattern,
            "anonymous listings need a name filter with a literal namespace",
        ))
    }
}

#[async_trait::async_trait]
impl Adapter for DockerHubAdapter {
    fn info(&self) -> Result<AdapterInfo, AdapterError> {
        Ok(Self::capabilities())
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    #[tracing::instrument(skip(self, filters, cancel), fields(adapter = DOCKER_HUB, url = %self.registry.url))]
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
        ensure_active(DOCKER_HUB, cancel)?;

        let exact = match filters.exact_repository() {
            Some(name) => {
                let (namespace, name) = split_repository(name)?;
                Some(format!("{namespace}/{name}"))
            }
            None => None,
        };

        let names = match &exact {
            Some(name) => vec![name.clone()],
            None => {
                let mut names = Vec::new();
                for namespace in self.candidate_namespaces(&filters, cancel).await? {
                    tracing::trace!(%namespace, "listing repositories");
                    names.extend(
                        self.client
                            .repositories(&namespace, cancel)
                            .await?
                            .into_iter()
                            .filter(|name| filters.matches_repository(name)),
                    );
                }
                names
            }
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

    #[tracing::instrument(skip(self, cancel), fields(adapter = DOCKER_HUB))]
    async fn delete_tag(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError> {
        ensure_active(DOCKER_HUB, cancel)?;
        self.client.delete_tag(repository, tag, cancel).await
    }

    #[tracing::instrument(skip(self, cancel), fields(adapter = DOCKER_HUB, url = %self.registry.url))]
    async fn health_check(&self, cancel: &CancellationToken) -> Result<HealthStatus, AdapterError> {
        ensure_active(DOCKER_HUB, cancel)?;
        health_from(self.client.ping(cancel).await)
    }
}

/// Builds [DockerHubAdapter]s.
#[derive(Debug, Clone, Default)]
pub struct DockerHubFactory {
    options: AdapterOptions,
}

impl DockerHubFactory {
    /// A factory whose adapters use `options`.
    pub fn new(options: AdapterOptions) -> Self {
        Self { options }
    }
}

impl AdapterFactory for DockerHubFactory {
    fn info(&self) -> AdapterInfo {
        DockerHubAdapter::capabilities()
    }

    fn create(&self, registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError> {
        Ok(Arc::new(DockerHubAdapter::new(registry, self.options.clone())?))
    }
}
