use std::sync::Arc;

use api_client::{ApiClient, CredentialAuth};
use http::{StatusCode, Uri};
use registry_adapter::validate::validate_registry;
use registry_adapter::{
    ensure_active, health_from, Adapter, AdapterError, AdapterFactory, AdapterOptions,
    CancellationToken, FilterSet,
};
use registry_model::{
    AdapterInfo, CredentialType, Filter, FilterType, HealthStatus, PathComponentType, Registry,
    RegistryType, Repository, Resource, ResourceType, TriggerType,
};

use crate::client::HarborClient;
use crate::HARBOR;

/// Credential types a Harbor instance understands.
const CREDENTIALS: &[CredentialType] = &[CredentialType::Basic, CredentialType::Secret];

/// Authorization scheme for shared secret credentials.
const SECRET_SCHEME: &str = "Harbor-Secret";

/// Adapter for a remote Harbor v2 instance.
///
/// Repositories are listed per project, and carry the project's metadata.
#[derive(Debug)]
pub struct HarborAdapter {
    registry: Registry,
    client: HarborClient,
}

fn prepare(
    registry: &Registry,
    options: &AdapterOptions,
) -> Result<(Uri, CredentialAuth), AdapterError> {
    options.validate()?;
    let base = validate_registry(HARBOR, registry, RegistryType::Harbor, CREDENTIALS)?;
    let auth = CredentialAuth::from_credential(registry.effective_credential(), SECRET_SCHEME);
    Ok((base, auth))
}

impl HarborAdapter {
    /// Bind an adapter to `registry`.
    pub fn new(registry: &Registry, options: AdapterOptions) -> Result<Self, AdapterError> {
        let (base, auth) = prepare(registry, &options)?;
        Ok(Self {
            registry: registry.clone(),
            client: HarborClient::new(ApiClient::new(base, auth), options),
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
            client: HarborClient::new(ApiClient::new_with_inner_service(base, auth, service), options),
        })
    }

    /// What every Harbor adapter can do.
    pub fn capabilities() -> AdapterInfo {
        AdapterInfo {
            registry_type: RegistryType::Harbor,
            description: "Harbor v2 registry".into(),
            supported_resource_types: vec![ResourceType::Artifact],
            supported_resource_filters: vec![
                FilterType::Name,
                FilterType::Tag,
                FilterType::Label,
                FilterType::Resource,
            ],
            supported_triggers: vec![
                TriggerType::Manual,
                TriggerType::Scheduled,
                TriggerType::EventBased,
            ],
            supported_repository_path_component_type: PathComponentType::Flexible,
        }
    }

    /// The descriptor without its credential, for attaching to resources.
    fn source(&self) -> Registry {
        Registry {
            credential: None,
            ..self.registry.clone()
        }
    }
}

#[async_trait::async_trait]
impl Adapter for HarborAdapter {
    fn info(&self) -> Result<AdapterInfo, AdapterError> {
        Ok(Self::capabilities())
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    #[tracing::instrument(skip(self, filters, cancel), fields(adapter = HARBOR, url = %self.registry.url))]
    async fn fetch_artifacts(
        &self,
        filters: &[Filter],
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, AdapterError> {
        let filters = FilterSet::new(filters)?;
        if !filters.admits_any(&Self::capabilities()) {
            tracing::debug!("resource type filters exclude everything harbor serves");
            return Ok(Vec::new());
        }
        ensure_active(HARBOR, cancel)?;

        let exact = filters.exact_repository();
        let projects = self.client.projects(filters.namespace(), cancel).await?;
        let mut resources = Vec::new();

        for project in projects {
            let names = match exact {
                Some(name) if name.starts_with(&format!("{}/", project.name)) => {
                    vec![name.to_owned()]
                }
                Some(_) => continue,
                None => self
                    .client
                    .repositories(&project.name, cancel)
                    .await?
                    .into_iter()
                    .map(|repository| repository.name)
                    .filter(|name| filters.matches_repository(name))
                    .collect(),
            };

            for name in names {
                tracing::trace!(repository = %name, "listing artifacts");
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

                let repository = Repository::new(name).with_metadata(project.metadata());
                resources.push(
                    Resource::new(ResourceType::Artifact, repository, artifacts)
                        .with_registry(self.source()),
                );
            }
        }

        Ok(resources)
    }

    #[tracing::instrument(skip(self, cancel), fields(adapter = HARBOR))]
    async fn delete_tag(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError> {
        ensure_active(HARBOR, cancel)?;
        self.client.delete_tag(repository, tag, cancel).await
    }

    #[tracing::instrument(skip(self, cancel), fields(adapter = HARBOR))]
    async fn repository_by_blob_digest(
        &self,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AdapterError> {
        ensure_active(HARBOR, cancel)?;
        self.client.repository_by_blob_digest(digest, cancel).await
    }

    #[tracing::instrument(skip(self, cancel), fields(adapter = HARBOR, url = %self.registry.url))]
    async fn health_check(&self, cancel: &CancellationToken) -> Result<HealthStatus, AdapterError> {
        ensure_active(HARBOR, cancel)?;
        health_from(self.client.ping(cancel).await)
    }
}

/// Builds [HarborAdapter]s.
#[derive(Debug, Clone, Default)]
pub struct HarborFactory {
    options: AdapterOptions,
}

impl HarborFactory {
    /// A factory whose adapters use `options`.
    pub fn new(options: AdapterOptions) -> Self {
        Self { options }
    }
}

impl AdapterFactory for HarborFactory {
    fn info(&self) -> AdapterInfo {
        HarborAdapter::capabilities()
    }

    fn create(&self, registry: &Registry) -> Result<Arc<dyn Adapter>, AdapterError> {
        Ok(Arc::new(HarborAdapter::new(registry, self.options.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::mock::MockService;
    use http::{HeaderMap, Method};
    use registry_adapter::AdapterErrorKind;
    use registry_model::Credential;

    static_assertions::assert_impl_all!(HarborAdapter: Send, Sync);

    const PROJECTS: &str = indoc::indoc! {r#"
        [
            {"project_id": 2, "name": "goharbor", "metadata": {"public": "true"}},
            {"project_id": 3, "name": "goharbor-dev", "metadata": {"public": "false"}}
        ]
    "#};

    const REPOSITORIES: &str = indoc::indoc! {r#"
        [
            {"id": 10, "name": "goharbor/harbor-core", "artifact_count": 2},
            {"id": 11, "name": "goharbor/harbor-jobservice", "artifact_count": 1}
        ]
    "#};

    const CORE_ARTIFACTS: &str = indoc::indoc! {r#"
        [
            {
                "type": "IMAGE",
                "digest": "sha256:c0re1",
                "tags": [{"name": "v2.10.0"}, {"name": "latest"}],
                "labels": [{"name": "release"}]
            },
            {
                "type": "IMAGE",
                "digest": "sha256:c0re2",
                "tags": [{"name": "dev"}],
                "labels": null
            }
        ]
    "#};

    const JOBSERVICE_ARTIFACTS: &str = indoc::indoc! {r#"
        [
            {"type": "IMAGE", "digest": "sha256:j0b", "tags": [{"name": "v2.10.0"}], "labels": []}
        ]
    "#};

    fn registry() -> Registry {
        Registry::new(RegistryType::Harbor, "https://harbor.test")
            .with_name("upstream")
            .with_credential(Credential::basic("admin", "Harbor12345"))
    }

    fn fixture() -> MockService {
        let mut mock = MockService::new();
        mock.json("/api/v2.0/projects", HeaderMap::new(), PROJECTS);
        mock.json(
            "/api/v2.0/projects/goharbor/repositories",
            HeaderMap::new(),
            REPOSITORIES,
        );
        mock.json(
            "/api/v2.0/projects/goharbor/repositories/harbor-core/artifacts",
            HeaderMap::new(),
            CORE_ARTIFACTS,
        );
        mock.json(
            "/api/v2.0/projects/goharbor/repositories/harbor-jobservice/artifacts",
            HeaderMap::new(),
            JOBSERVICE_ARTIFACTS,
        );
        mock
    }

    fn adapter(mock: &MockService) -> HarborAdapter {
        HarborAdapter::with_service(&registry(), AdapterOptions::default(), mock.clone()).unwrap()
    }

    #[test]
    fn info() {
        let adapter = adapter(&MockService::new());
        let info = adapter.info().unwrap();
        assert_eq!(info.registry_type, RegistryType::Harbor);
        assert_eq!(info.supported_resource_types, vec![ResourceType::Artifact]);
        assert_eq!(
            info.supported_repository_path_component_type,
            PathComponentType::Flexible
        );
    }

    #[tokio::test]
    async fn fetch_exact_repository() {
        let mock = fixture();
        let adapter = adapter(&mock);

        let resources = adapter
            .fetch_artifacts(
                &[Filter::name("goharbor/harbor-core")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(resources.len(), 1);
        let resource = &resources[0];
        assert_eq!(resource.repository_name(), Some("goharbor/harbor-core"));
        assert_eq!(resource.artifacts().len(), 2);
        assert_eq!(resource.kind, ResourceType::Artifact);

        let metadata = &resource.metadata.as_ref().unwrap().repository.as_ref().unwrap().metadata;
        assert_eq!(metadata["public"], "true");

        let registry = resource.registry.as_ref().unwrap();
        assert_eq!(registry.name, "upstream");
        assert!(registry.credential.is_none());

        // The exact name skips listing the project's repositories.
        assert!(mock
            .requests()
            .iter()
            .all(|request| !request.path.starts_with("/api/v2.0/projects/goharbor/repositories?")));

        let projects = &mock.requests()[0];
        assert!(projects.path.contains("name=goharbor"));
        assert!(projects.headers.contains_key(http::header::AUTHORIZATION));
    }

    #[tokio::test]
    async fn fetch_with_wildcards_and_tags() {
        let mock = fixture();
        let adapter = adapter(&mock);

        let resources = adapter
            .fetch_artifacts(
                &[Filter::name("goharbor/*"), Filter::tag("v2.*")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let names: Vec<_> = resources
            .iter()
            .map(|resource| resource.repository_name().unwrap())
            .collect();
        assert_eq!(names, vec!["goharbor/harbor-core", "goharbor/harbor-jobservice"]);

        let core = resources[0].artifacts();
        assert_eq!(core.len(), 1);
        assert_eq!(core[0].digest, "sha256:c0re1");
        assert_eq!(core[0].tags.iter().collect::<Vec<_>>(), vec!["v2.10.0"]);
    }

    #[tokio::test]
    async fn fetch_with_labels() {
        let mock = fixture();
        let adapter = adapter(&mock);

        let resources = adapter
            .fetch_artifacts(
                &[Filter::name("goharbor/**"), Filter::label("release")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].artifacts()[0].digest, "sha256:c0re1");
    }

    #[tokio::test]
    async fn missing_exact_repository_is_empty() {
        let mock = fixture();
        let adapter = adapter(&mock);

        let resources = adapter
            .fetch_artifacts(&[Filter::name("goharbor/missing")], &CancellationToken::new())
            .await
            .unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn follows_project_pages() {
        let mut mock = MockService::new();
        let mut link = HeaderMap::new();
        link.insert(
            http::header::LINK,
            "</api/v2.0/projects?page=2&page_size=1>; rel=\"next\"".parse().unwrap(),
        );
        mock.json(
            "/api/v2.0/projects?page_size=1",
            link,
            r#"[{"name": "first", "metadata": {}}]"#,
        );
        mock.json(
            "/api/v2.0/projects?page=2&page_size=1",
            HeaderMap::new(),
            r#"[{"name": "second", "metadata": {}}]"#,
        );
        mock.json(
            "/api/v2.0/projects/first/repositories",
            HeaderMap::new(),
            r#"[{"name": "first/app"}]"#,
        );
        mock.json(
            "/api/v2.0/projects/second/repositories",
            HeaderMap::new(),
            r#"[{"name": "second/team/app"}]"#,
        );
        mock.json(
            "/api/v2.0/projects/first/repositories/app/artifacts",
            HeaderMap::new(),
            r#"[{"type": "IMAGE", "digest": "sha256:1", "tags": [{"name": "v1"}]}]"#,
        );
        mock.json(
            "/api/v2.0/projects/second/repositories/team%252Fapp/artifacts",
            HeaderMap::new(),
            r#"[{"type": "CHART", "digest": "sha256:2", "tags": [{"name": "v1"}]}]"#,
        );

        let options = AdapterOptions {
            page_size: 1,
            ..Default::default()
        };
        let adapter = HarborAdapter::with_service(&registry(), options, mock.clone()).unwrap();

        let resources = adapter
            .fetch_artifacts(&[], &CancellationToken::new())
            .await
            .unwrap();
        let names: Vec<_> = resources
            .iter()
            .map(|resource| resource.repository_name().unwrap())
            .collect();
        assert_eq!(names, vec!["first/app", "second/team/app"]);

        let charts = adapter
            .fetch_artifacts(&[Filter::resource("chart")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].repository_name(), Some("second/team/app"));
    }

    #[tokio::test]
    async fn blob_digest_lookup() {
        let mut mock = MockService::new();
        mock.json("/api/v2.0/repositories", HeaderMap::new(), "[]");
        let adapter = adapter(&mock);
        let cancel = CancellationToken::new();

        assert_eq!(
            adapter
                .repository_by_blob_digest("sha256:nothing", &cancel)
                .await
                .unwrap(),
            None
        );
        assert!(mock.requests()[0]
            .path
            .contains("q=blob_digest%3Dsha256%3Anothing"));

        let mut mock = MockService::new();
        mock.json(
            "/api/v2.0/repositories",
            HeaderMap::new(),
            r#"[{"name": "library/hello-world"}]"#,
        );
        let adapter = self::adapter(&mock);

        assert_eq!(
            adapter
                .repository_by_blob_digest("sha256:abc", &cancel)
                .await
                .unwrap()
                .as_deref(),
            Some("library/hello-world")
        );
    }

    #[tokio::test]
    async fn delete_tag_encodes_repository() {
        let mut mock = MockService::new();
        mock.add(
            Method::DELETE,
            "/api/v2.0/projects/library/repositories/team%252Fapp/artifacts/v1/tags/v1",
            StatusCode::OK,
            HeaderMap::new(),
            Vec::new(),
        );
        let adapter = adapter(&mock);

        adapter
            .delete_tag("library/team/app", "v1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(mock.requests()[0].method, Method::DELETE);

        let error = adapter
            .delete_tag("library/team/app", "v2", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::Transport);
        assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
        assert!(!error.is_retryable());

        let error = adapter
            .delete_tag("orphan", "v1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidRepository);
    }

    #[tokio::test]
    async fn server_errors_carry_context() {
        let mut mock = fixture();
        mock.add(
            Method::GET,
            "/api/v2.0/projects/goharbor/repositories/harbor-core/artifacts",
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            b"database unavailable".to_vec(),
        );
        let adapter = adapter(&mock);

        let error = adapter
            .fetch_artifacts(
                &[Filter::name("goharbor/harbor-core")],
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::Transport);
        assert_eq!(error.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(error
            .url()
            .unwrap()
            .starts_with("https://harbor.test/api/v2.0/projects/goharbor/repositories/harbor-core/artifacts"));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_before_any_request() {
        let mock = fixture();
        let adapter = adapter(&mock);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = adapter.fetch_artifacts(&[], &cancel).await.unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::Canceled);
        assert!(adapter.health_check(&cancel).await.is_err());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn health() {
        let mut mock = MockService::new();
        mock.add(
            Method::GET,
            "/api/v2.0/ping",
            StatusCode::OK,
            HeaderMap::new(),
            b"Pong".to_vec(),
        );
        let cancel = CancellationToken::new();

        assert_eq!(
            adapter(&mock).health_check(&cancel).await.unwrap(),
            HealthStatus::Healthy
        );
        assert_eq!(
            adapter(&MockService::new()).health_check(&cancel).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn secret_credentials() {
        let registry = Registry::new(RegistryType::Harbor, "https://harbor.test")
            .with_credential(Credential::new(CredentialType::Secret, "", "s3cr3t"));
        assert!(HarborAdapter::with_service(&registry, AdapterOptions::default(), MockService::new()).is_ok());

        let registry = Registry::new(RegistryType::Harbor, "https://harbor.test")
            .with_credential(Credential::new(CredentialType::OAuth, "", "token"));
        let error =
            HarborAdapter::with_service(&registry, AdapterOptions::default(), MockService::new())
                .unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn secret_credentials_use_harbor_scheme() {
        let mut mock = MockService::new();
        mock.json("/api/v2.0/ping", HeaderMap::new(), "\"Pong\"");
        let registry = Registry::new(RegistryType::Harbor, "https://harbor.test")
            .with_credential(Credential::new(CredentialType::Secret, "", "s3cr3t"));
        let adapter =
            HarborAdapter::with_service(&registry, AdapterOptions::default(), mock.clone())
                .unwrap();

        adapter.health_check(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            mock.requests()[0].headers[http::header::AUTHORIZATION],
            "Harbor-Secret s3cr3t"
        );
    }

    #[test]
    fn factory_validates() {
        let factory = HarborFactory::default();
        assert_eq!(factory.info().registry_type, RegistryType::Harbor);
        assert!(factory.create(&registry()).is_ok());

        let error = factory
            .create(&Registry::new(RegistryType::Harbor, ""))
            .unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);
    }
}
