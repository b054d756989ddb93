//! Calls against the distribution `/v2/` API.

use api_client::response::ApiResponse;
use api_client::{ApiClient, CredentialAuth, LinkPaginated, PageBody, RequestBuilder};
use registry_adapter::validate::validate_repository;
use registry_adapter::{AdapterError, AdapterErrorKind, AdapterOptions, CancellationToken, RepositoryCodec};
use registry_model::Artifact;
use serde::Deserialize;

use crate::DISTRIBUTION;

const IMAGE: &str = "IMAGE";

#[derive(Debug, Deserialize)]
pub(crate) struct Catalog {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

impl PageBody for Catalog {
    type Item = String;

    fn into_items(self) -> Vec<Self::Item> {
        self.repositories.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl PageBody for TagList {
    type Item = String;

    fn into_items(self) -> Vec<Self::Item> {
        self.tags.unwrap_or_default()
    }
}

/// Client for one distribution registry.
#[derive(Debug, Clone)]
pub(crate) struct DistributionClient {
    inner: ApiClient<CredentialAuth>,
    options: AdapterOptions,
}

impl DistributionClient {
    pub(crate) fn new(inner: ApiClient<CredentialAuth>, options: AdapterOptions) -> Self {
        Self { inner, options }
    }

    fn paged(&self, path: &str) -> Result<String, AdapterError> {
        let n = self.options.page_size.to_string();
        let query = serde_urlencoded::to_string([("n", n.as_str())])
            .map_err(AdapterError::with(DISTRIBUTION, AdapterErrorKind::InvalidConfig))?;
        Ok(format!("{path}?{query}"))
    }

    async fn send(
        &self,
        builder: RequestBuilder<CredentialAuth>,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, AdapterError> {
        let mut builder = builder.cancellation(cancel.clone());
        if let Some(timeout) = self.options.request_timeout() {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(AdapterError::client(DISTRIBUTION))?;
        response
            .error_for_status()
            .await
            .map_err(|error| AdapterError::from_client(DISTRIBUTION, error.into()))
    }

    async fn list<B>(&self, endpoint: &str, cancel: &CancellationToken) -> Result<Vec<B::Item>, AdapterError>
    where
        B: PageBody + Send + 'static,
        B::Item: Send + 'static,
    {
        self.inner
            .paginate::<LinkPaginated<B>>(endpoint)
            .map_err(AdapterError::client(DISTRIBUTION))?
            .with_max_pages(self.options.max_pages)
            .with_timeout(self.options.request_timeout())
            .with_cancellation(cancel.clone())
            .collect_all()
            .await
            .map_err(AdapterError::client(DISTRIBUTION))
    }

    /// Every repository in the catalog.
    pub(crate) async fn catalog(&self, cancel: &CancellationToken) -> Result<Vec<String>, AdapterError> {
        let endpoint = self.paged("v2/_catalog")?;
        self.list::<Catalog>(&endpoint, cancel).await
    }

    /// One artifact per tag. Tag listings don't carry digests.
    pub(crate) async fn artifacts(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>, AdapterError> {
        validate_repository(DISTRIBUTION, repository)?;
        let endpoint = self.paged(&format!(
            "v2/{}/tags/list",
            RepositoryCodec::Segments.encode(repository)
        ))?;

        let tags = self.list::<TagList>(&endpoint, cancel).await?;
        Ok(tags
            .into_iter()
            .map(|tag| Artifact::new(IMAGE, "").with_tags([tag]))
            .collect())
    }

    pub(crate) async fn ping(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.send(self.inner.get("v2/"), cancel).await?;
        Ok(())
    }
}
