//! Calls against the Harbor v2.0 API.

use api_client::response::ApiResponse;
use api_client::{ApiClient, CredentialAuth, LinkPaginated};
use http::Method;
use registry_adapter::{
    AdapterError, AdapterErrorKind, AdapterOptions, CancellationToken, RepositoryCodec,
};
use registry_model::{Artifact, Metadata};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::HARBOR;

const API_BASE: &str = "api/v2.0";

/// A Harbor project, which owns the first path segment of its repositories.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Project {
    pub(crate) name: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl Project {
    pub(crate) fn metadata(&self) -> Metadata {
        self.metadata.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoRecord {
    pub(crate) name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ArtifactRecord {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    tags: Option<Vec<Named>>,
    #[serde(default)]
    labels: Option<Vec<Named>>,
}

impl From<ArtifactRecord> for Artifact {
    fn from(record: ArtifactRecord) -> Self {
        Artifact::new(record.kind, record.digest)
            .with_tags(record.tags.unwrap_or_default().into_iter().map(|tag| tag.name))
            .with_labels(
                record
                    .labels
                    .unwrap_or_default()
                    .into_iter()
                    .map(|label| label.name),
            )
    }
}

/// Split `project/rest` into its project and the repository path inside it.
pub(crate) fn split_repository(repository: &str) -> Result<(&str, &str), AdapterError> {
    registry_adapter::validate::validate_repository(HARBOR, repository)?;
    repository.split_once('/').ok_or_else(|| {
        AdapterError::new(
            HARBOR,
            AdapterErrorKind::InvalidRepository,
            format!("{repository:?} is not inside a project"),
        )
    })
}

fn query(pairs: &[(&str, &str)]) -> Result<String, AdapterError> {
    serde_urlencoded::to_string(pairs)
        .map_err(AdapterError::with(HARBOR, AdapterErrorKind::InvalidConfig))
}

/// Client for one Harbor instance.
#[derive(Debug, Clone)]
pub(crate) struct HarborClient {
    inner: ApiClient<CredentialAuth>,
    options: AdapterOptions,
}

impl HarborClient {
    pub(crate) fn new(inner: ApiClient<CredentialAuth>, options: AdapterOptions) -> Self {
        Self { inner, options }
    }

    fn endpoint(&self, path: &str, pairs: &[(&str, &str)]) -> Result<String, AdapterError> {
        if pairs.is_empty() {
            Ok(format!("{API_BASE}/{path}"))
        } else {
            Ok(format!("{API_BASE}/{path}?{}", query(pairs)?))
        }
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, AdapterError> {
        let mut builder = self
            .inner
            .request(method, endpoint)
            .cancellation(cancel.clone());
        if let Some(timeout) = self.options.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(AdapterError::client(HARBOR))?;
        response
            .error_for_status()
            .await
            .map_err(|error| AdapterError::from_client(HARBOR, error.into()))
    }

    async fn list<T>(&self, endpoint: &str, cancel: &CancellationToken) -> Result<Vec<T>, AdapterError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.inner
            .paginate::<LinkPaginated<Vec<T>>>(endpoint)
            .map_err(AdapterError::client(HARBOR))?
            .with_max_pages(self.options.max_pages)
            .with_timeout(self.options.request_timeout())
            .with_cancellation(cancel.clone())
            .collect_all()
            .await
            .map_err(AdapterError::client(HARBOR))
    }

    /// Projects, optionally only the one called `name`.
    pub(crate) async fn projects(
        &self,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Project>, AdapterError> {
        let page_size = self.options.page_size.to_string();
        let mut pairs = vec![("page_size", page_size.as_str())];
        if let Some(name) = name {
            pairs.push(("name", name));
        }

        let endpoint = self.endpoint("projects", &pairs)?;
        let mut projects: Vec<Project> = self.list(&endpoint, cancel).await?;

        // The name query is a fuzzy match.
        if let Some(name) = name {
            projects.retain(|project| project.name == name);
        }
        Ok(projects)
    }

    pub(crate) async fn repositories(
        &self,
        project: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RepoRecord>, AdapterError> {
        let page_size = self.options.page_size.to_string();
        let path = format!(
            "projects/{}/repositories",
            RepositoryCodec::Segments.encode(project)
        );
        let endpoint = self.endpoint(&path, &[("page_size", page_size.as_str())])?;
        self.list(&endpoint, cancel).await
    }

    pub(crate) async fn artifacts(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>, AdapterError> {
        let (project, rest) = split_repository(repository)?;
        let page_size = self.options.page_size.to_string();
        let path = format!(
            "projects/{}/repositories/{}/artifacts",
            RepositoryCodec::Segments.encode(project),
            RepositoryCodec::Nested.encode(rest)
        );
        let endpoint =
            self.endpoint(&path, &[("with_label", "true"), ("page_size", page_size.as_str())])?;

        let records: Vec<ArtifactRecord> = self.list(&endpoint, cancel).await?;
        Ok(records.into_iter().map(Artifact::from).collect())
    }

    pub(crate) async fn delete_tag(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError> {
        let (project, rest) = split_repository(repository)?;
        let tag = RepositoryCodec::Segments.encode(tag);
        let path = format!(
            "projects/{}/repositories/{}/artifacts/{tag}/tags/{tag}",
            RepositoryCodec::Segments.encode(project),
            RepositoryCodec::Nested.encode(rest),
        );

        self.send(Method::DELETE, &self.endpoint(&path, &[])?, cancel)
            .await?;
        Ok(())
    }

    /// The first repository holding a blob, if any does.
    pub(crate) async fn repository_by_blob_digest(
        &self,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AdapterError> {
        let q = format!("blob_digest={digest}");
        let endpoint = self.endpoint(
            "repositories",
            &[("q", q.as_str()), ("page_size", "1"), ("page_number", "1")],
        )?;

        let repositories: Vec<RepoRecord> = self
            .send(Method::GET, &endpoint, cancel)
            .await?
            .json()
            .await
            .map_err(AdapterError::client(HARBOR))?;

        Ok(repositories
            .into_iter()
            .map(|repository| repository.name)
            .find(|name| !name.is_empty()))
    }

    pub(crate) async fn ping(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.send(Method::GET, &self.endpoint("ping", &[])?, cancel)
            .await?;
        Ok(())
    }
}
