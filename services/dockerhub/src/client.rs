//! Calls against the Docker Hub v2 API.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use api_client::response::ApiResponse;
use api_client::uri::UriExtension as _;
use api_client::{
    ApiClient, BoxError, CredentialAuth, PaginationInfo, Paginator, RequestBuilder, SchemeAuth,
    Secret,
};
use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use registry_adapter::validate::normalize_repository;
use registry_adapter::{AdapterError, AdapterErrorKind, AdapterOptions, CancellationToken, RepositoryCodec};
use registry_model::{Artifact, Credential, PathComponentType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::DOCKER_HUB;

const LOGIN: &str = "v2/users/login/";
const JWT_SCHEME: &str = "JWT";

/// Artifact type reported for every tag.
const IMAGE: &str = "IMAGE";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct HubPage<T> {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Option<Vec<T>>,
}

/// A page of a Docker Hub listing, which names its successor in the body.
#[derive(Debug)]
pub(crate) struct HubPaginated<T> {
    items: Vec<T>,
    next: Option<String>,
}

impl<T> PaginationInfo for HubPaginated<T> {
    fn next(&self, current: &Uri) -> Option<Uri> {
        let reference = self.next.as_deref().filter(|next| !next.is_empty())?;
        current.resolve(reference)
    }
}

impl<T: DeserializeOwned> Paginator for HubPaginated<T> {
    type Item = T;

    fn from_response(_head: &http::response::Parts, body: Bytes) -> Result<Self, BoxError> {
        let page: HubPage<T> = serde_json::from_slice(&body)?;
        Ok(Self {
            items: page.results.unwrap_or_default(),
            next: page.next,
        })
    }

    fn items(&mut self) -> Vec<Self::Item> {
        std::mem::take(&mut self.items)
    }
}

#[derive(Debug, Deserialize)]
struct Namespaces {
    #[serde(default)]
    namespaces: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RepoRecord {
    pub(crate) name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageRecord {
    #[serde(default)]
    digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TagRecord {
    name: String,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    images: Option<Vec<ImageRecord>>,
}

impl TagRecord {
    fn digest(&self) -> &str {
        self.digest
            .as_deref()
            .filter(|digest| !digest.is_empty())
            .or_else(|| {
                self.images
                    .iter()
                    .flatten()
                    .find_map(|image| image.digest.as_deref())
            })
            .unwrap_or_default()
    }
}

/// Fold tags which point at the same digest into one artifact, in the order
/// each digest first appears.
pub(crate) fn group_tags(tags: Vec<TagRecord>) -> Vec<Artifact> {
    let mut artifacts: Vec<Artifact> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for tag in tags {
        let digest = tag.digest().to_owned();
        if digest.is_empty() {
            artifacts.push(Artifact::new(IMAGE, digest).with_tags([tag.name]));
            continue;
        }

        match seen.get(&digest) {
            Some(&index) => {
                artifacts[index].tags.insert(tag.name);
            }
            None => {
                seen.insert(digest.clone(), artifacts.len());
                artifacts.push(Artifact::new(IMAGE, digest).with_tags([tag.name]));
            }
        }
    }

    artifacts
}

/// Split a repository into its namespace and name, putting single segment
/// names into `library`.
pub(crate) fn split_repository(repository: &str) -> Result<(String, String), AdapterError> {
    let normalized = normalize_repository(DOCKER_HUB, repository, PathComponentType::OnlyTwo)?;
    match normalized.split_once('/') {
        Some((namespace, name)) => Ok((namespace.to_owned(), name.to_owned())),
        None => Err(AdapterError::new(
            DOCKER_HUB,
            AdapterErrorKind::InvalidRepository,
            format!("{repository:?} has no namespace"),
        )),
    }
}

fn repository_path(repository: &str) -> Result<String, AdapterError> {
    let (namespace, name) = split_repository(repository)?;
    Ok(format!(
        "v2/repositories/{}/{}",
        RepositoryCodec::Segments.encode(&namespace),
        RepositoryCodec::Segments.encode(&name)
    ))
}

#[derive(Serialize)]
struct Login<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginToken {
    token: Secret,
}

/// How long a login token is trusted before logging in again.
pub(crate) const TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Client for the Docker Hub API.
///
/// Credentials are exchanged for a JWT on the first call which needs them.
/// The token is replaced once it is older than the token lifetime, or when
/// the hub rejects it.
#[derive(Debug)]
pub(crate) struct HubClient {
    inner: ApiClient<CredentialAuth>,
    credential: Option<Credential>,
    issued: Mutex<Option<Instant>>,
    token_lifetime: Duration,
    options: AdapterOptions,
}

impl HubClient {
    pub(crate) fn new(
        inner: ApiClient<CredentialAuth>,
        credential: Option<Credential>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            inner,
            credential,
            issued: Mutex::new(None),
            token_lifetime: TOKEN_LIFETIME,
            options,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_token_lifetime(&mut self, lifetime: Duration) {
        self.token_lifetime = lifetime;
    }

    pub(crate) fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    fn page_query(&self, path: &str) -> Result<String, AdapterError> {
        let page_size = self.options.page_size.to_string();
        let query = serde_urlencoded::to_string([("page_size", page_size.as_str())])
            .map_err(AdapterError::with(DOCKER_HUB, AdapterErrorKind::InvalidConfig))?;
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

        let response = builder.send().await.map_err(AdapterError::client(DOCKER_HUB))?;
        response
            .error_for_status()
            .await
            .map_err(|error| AdapterError::from_client(DOCKER_HUB, error.into()))
    }

    /// Make sure a fresh token is in use, if there is a credential to log in with.
    ///
    /// Returns when the token in use was issued. A token issued at `stale` is
    /// replaced even if it has not expired yet.
    async fn authenticate(
        &self,
        stale: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Option<Instant>, AdapterError> {
        let Some(credential) = &self.credential else {
            return Ok(None);
        };

        let mut issued = self.issued.lock().await;
        if let Some(at) = *issued {
            if Some(at) != stale && at.elapsed() < self.token_lifetime {
                return Ok(Some(at));
            }
        }

        tracing::debug!(username = %credential.access_key, "logging in to docker hub");
        *issued = None;
        self.inner.refresh_auth(CredentialAuth::Anonymous);
        let body = Login {
            username: &credential.access_key,
            password: credential.access_secret.revealed(),
        };
        let request = self
            .inner
            .post(LOGIN)
            .json(&body)
            .map_err(AdapterError::client(DOCKER_HUB))?;

        let login: LoginToken = self
            .send(request, cancel)
            .await?
            .json()
            .await
            .map_err(AdapterError::client(DOCKER_HUB))?;

        self.inner
            .refresh_auth(CredentialAuth::Scheme(SchemeAuth::new(JWT_SCHEME, login.token)));
        let at = Instant::now();
        *issued = Some(at);
        Ok(Some(at))
    }

    /// Run `call` with a fresh token, logging in again once if the hub rejects it.
    async fn authenticated<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, AdapterError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let issued = self.authenticate(None, cancel).await?;
        match call().await {
            Err(error) if issued.is_some() && error.status() == Some(StatusCode::UNAUTHORIZED) => {
                tracing::debug!("docker hub rejected the token, logging in again");
                self.authenticate(issued, cancel).await?;
                call().await
            }
            result => result,
        }
    }

    async fn list<T>(&self, endpoint: &str, cancel: &CancellationToken) -> Result<Vec<T>, AdapterError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.authenticated(cancel, move || async move {
            self.inner
                .paginate::<HubPaginated<T>>(endpoint)
                .map_err(AdapterError::client(DOCKER_HUB))?
                .with_max_pages(self.options.max_pages)
                .with_timeout(self.options.request_timeout())
                .with_cancellation(cancel.clone())
                .collect_all()
                .await
                .map_err(AdapterError::client(DOCKER_HUB))
        })
        .await
    }

    /// Namespaces the logged in user can see.
    pub(crate) async fn namespaces(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AdapterError> {
        let namespaces: Namespaces = self
            .authenticated(cancel, move || {
                self.send(self.inner.get("v2/repositories/namespaces/"), cancel)
            })
            .await?
            .json()
            .await
            .map_err(AdapterError::client(DOCKER_HUB))?;
        Ok(namespaces.namespaces)
    }

    /// Full names of the repositories in `namespace`.
    pub(crate) async fn repositories(
        &self,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AdapterError> {
        let endpoint = self.page_query(&format!(
            "v2/repositories/{}/",
            RepositoryCodec::Segments.encode(namespace)
        ))?;
        let records: Vec<RepoRecord> = self.list(&endpoint, cancel).await?;
        Ok(records
            .into_iter()
            .map(|record| format!("{namespace}/{}", record.name))
            .collect())
    }

    pub(crate) async fn artifacts(
        &self,
        repository: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>, AdapterError> {
        let endpoint = self.page_query(&format!("{}/tags/", repository_path(repository)?))?;
        let tags: Vec<TagRecord> = self.list(&endpoint, cancel).await?;
        Ok(group_tags(tags))
    }

    pub(crate) async fn delete_tag(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError> {
        let endpoint = format!(
            "{}/tags/{}/",
            repository_path(repository)?,
            RepositoryCodec::Segments.encode(tag)
        );
        let endpoint = endpoint.as_str();
        self.authenticated(cancel, move || {
            self.send(self.inner.request(Method::DELETE, endpoint), cancel)
        })
        .await?;
        Ok(())
    }

    pub(crate) async fn ping(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        self.authenticated(cancel, move || {
            self.send(self.inner.get("v2/repositories/library/?page_size=1"), cancel)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_sharing_a_digest_are_one_artifact() {
        let page: HubPage<TagRecord> = serde_json::from_str(indoc::indoc! {r#"
            {
                "count": 4,
                "next": null,
                "previous": null,
                "results": [
                    {"name": "latest", "digest": "sha256:aaa", "images": []},
                    {"name": "1.27", "digest": "sha256:aaa"},
                    {"name": "1.26", "images": [{"digest": "sha256:bbb", "architecture": "amd64"}]},
                    {"name": "orphan"}
                ]
            }
        "#})
        .unwrap();

        let artifacts = group_tags(page.results.unwrap());
        assert_eq!(artifacts.len(), 3);
        assert_eq!(artifacts[0].digest, "sha256:aaa");
        assert_eq!(
            artifacts[0].tags.iter().collect::<Vec<_>>(),
            vec!["1.27", "latest"]
        );
        assert_eq!(artifacts[1].digest, "sha256:bbb");
        assert_eq!(artifacts[2].digest, "");
        assert!(artifacts.iter().all(|artifact| artifact.kind == IMAGE));
    }

    #[test]
    fn repositories_have_two_segments() {
        assert_eq!(
            split_repository("nginx").unwrap(),
            ("library".to_owned(), "nginx".to_owned())
        );
        assert_eq!(
            repository_path("bitnami/redis").unwrap(),
            "v2/repositories/bitnami/redis"
        );
        assert_eq!(
            split_repository("a/b/c").unwrap_err().kind(),
            AdapterErrorKind::InvalidRepository
        );
    }

    #[test]
    fn body_links_continue_pages() {
        let page = HubPaginated::<RepoRecord>::from_response(
            &http::Response::new(()).into_parts().0,
            Bytes::from_static(
                br#"{"next": "https://hub.docker.com/v2/repositories/library/?page=2", "results": [{"name": "nginx"}]}"#,
            ),
        )
        .unwrap();

        let current: Uri = "https://hub.docker.com/v2/repositories/library/".parse().unwrap();
        assert_eq!(
            page.next(&current).unwrap().to_string(),
            "https://hub.docker.com/v2/repositories/library/?page=2"
        );

        let last = HubPaginated::<RepoRecord>::from_response(
            &http::Response::new(()).into_parts().0,
            Bytes::from_static(br#"{"next": null, "results": null}"#),
        )
        .unwrap();
        assert!(last.next(&current).is_none());
    }
}
