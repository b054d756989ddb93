//! A small HTTP client for talking to remote registry APIs.
//!
//! [ApiClient] wraps a `hyperdriver` client service with a swappable
//! authentication layer, resolves endpoints against a base URI, and provides
//! cancellable request execution and [Paginated] listings.

use std::sync::Arc;

use arc_swap::ArcSwap;
use arc_swap::Guard;
use http::header::{HeaderValue, ACCEPT};
use http::Method;
use http::Uri;
use hyperdriver::service::SharedService;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::set_header::SetRequestHeaderLayer;

mod authentication;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod paginate;
pub mod request;
pub mod response;
pub mod uri;

pub use self::authentication::{
    basic_auth, Authentication, AuthenticationLayer, AuthenticationService, BasicAuth,
    BearerAuth, CredentialAuth, SchemeAuth,
};
pub use self::error::{BoxError, Error, HttpResponseError};
pub use self::paginate::{
    next_link, LinkPaginated, PageBody, Paginated, PaginationInfo, Paginator, DEFAULT_MAX_PAGES,
};
pub use self::request::RequestBuilder;
use self::response::ApiResponse;
use self::uri::UriExtension as _;
pub use credential::Secret;

fn accept_json() -> SetRequestHeaderLayer<HeaderValue> {
    SetRequestHeaderLayer::if_not_present(ACCEPT, HeaderValue::from_static("application/json"))
}

/// A client for accessing APIs over HTTP / HTTPS
///
/// Useful inner object to wrap for individual API clients. Cloning is cheap,
/// and clones share the same connection pool and authentication.
#[derive(Debug)]
pub struct ApiClient<A> {
    base: Uri,
    inner: hyperdriver::client::SharedClientService<hyperdriver::Body, hyperdriver::Body>,
    authentication: Arc<ArcSwap<A>>,
}

impl<A> Clone for ApiClient<A> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            inner: self.inner.clone(),
            authentication: self.authentication.clone(),
        }
    }
}

impl<A> ApiClient<A>
where
    A: Authentication + Send + Sync + 'static,
{
    /// Create a new API Client from a base URL and an authentication method
    pub fn new(base: Uri, authentication: A) -> Self {
        let authentication = Arc::new(ArcSwap::new(Arc::new(authentication)));
        let inner = hyperdriver::Client::build_tcp_http()
            .with_default_tls()
            .layer(AuthenticationLayer::new(authentication.clone()))
            .layer(accept_json())
            .build_service();

        ApiClient {
            base,
            inner,
            authentication,
        }
    }

    /// Create a new API Client which sends requests through `inner` instead of
    /// its own transport.
    pub fn new_with_inner_service<S>(base: Uri, authentication: A, inner: S) -> Self
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
        let authentication = Arc::new(ArcSwap::new(Arc::new(authentication)));

        let service = tower::ServiceBuilder::new()
            .layer(SharedService::layer())
            .layer(AuthenticationLayer::new(authentication.clone()))
            .layer(accept_json())
            .service(inner);

        ApiClient {
            base,
            inner: service,
            authentication,
        }
    }

    /// Replace the authentication used for subsequent requests.
    pub fn refresh_auth(&self, authentication: A) {
        self.authentication.store(Arc::new(authentication));
    }

    /// The authentication currently in use.
    pub fn auth(&self) -> Guard<Arc<A>> {
        self.authentication.as_ref().load()
    }
}

impl<A> ApiClient<A> {
    /// The URI endpoints are resolved against.
    pub fn base(&self) -> &Uri {
        &self.base
    }

    fn endpoint(&self, endpoint: &str) -> Uri {
        self.base.clone().join(endpoint)
    }

    /// Build a request with an arbitrary method.
    pub fn request(&self, method: Method, endpoint: &str) -> RequestBuilder<A> {
        RequestBuilder::new(self.clone(), self.endpoint(endpoint), method)
    }

    /// Build a GET request.
    pub fn get(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::GET, endpoint)
    }

    /// Build a HEAD request.
    pub fn head(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::HEAD, endpoint)
    }

    /// Build a POST request.
    pub fn post(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::POST, endpoint)
    }

    /// Build a DELETE request.
    pub fn delete(&self, endpoint: &str) -> RequestBuilder<A> {
        self.request(Method::DELETE, endpoint)
    }

    /// Start a paginated listing at `endpoint`.
    pub fn paginate<P>(&self, endpoint: &str) -> Result<Paginated<A, P>, Error>
    where
        P: Paginator,
    {
        let request = self.get(endpoint).build()?;
        Ok(Paginated::new(self.clone(), request))
    }

    /// Send a request and wait for the response head.
    pub async fn execute(&self, req: http::Request<hyperdriver::Body>) -> Result<ApiResponse, Error> {
        let parts = request::request_parts(&req);

        let response = self
            .inner
            .clone()
            .oneshot(req)
            .await
            .map_err(|source| Error::request(parts.uri.clone(), source))?;
        Ok(ApiResponse::new(parts, response))
    }

    /// Send a request, abandoning it if `cancel` fires first.
    pub async fn execute_with_cancellation(
        &self,
        req: http::Request<hyperdriver::Body>,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("request cancelled in flight");
                Err(Error::Canceled)
            }
            response = self.execute(req) => response,
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::mock::MockService;

    #[test]
    fn extensions_produce_send_futures() {
        let client = ApiClient::new(
            "http://httpbin.org/get/".parse().unwrap(),
            BearerAuth::new(Secret::from("secret garden")),
        );
        let builder = client.get("frobulator");

        fn assert_send<T: Send>(_t: T) {}

        let fut = builder.send();
        assert_send(fut);
    }

    #[tokio::test]
    async fn mock_client_applies_auth_and_accept() {
        let mut mock = MockService::new();
        mock.json("/v2/", http::HeaderMap::new(), "{}");

        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            BearerAuth::new(Secret::from("secret garden")),
            mock.clone(),
        );

        let response = client.get("v2/").send().await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].headers[http::header::AUTHORIZATION],
            "Bearer secret garden"
        );
        assert_eq!(requests[0].headers[ACCEPT], "application/json");
    }

    #[tokio::test]
    async fn refreshed_auth_is_used() {
        let mut mock = MockService::new();
        mock.json("/ping", http::HeaderMap::new(), "{}");

        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            CredentialAuth::Anonymous,
            mock.clone(),
        );

        client.get("ping").send().await.unwrap();
        client.refresh_auth(CredentialAuth::Scheme(SchemeAuth::new("JWT", "token")));
        client.get("ping").send().await.unwrap();

        let requests = mock.requests();
        assert!(!requests[0]
            .headers
            .contains_key(http::header::AUTHORIZATION));
        assert_eq!(requests[1].headers[http::header::AUTHORIZATION], "JWT token");
    }

    #[tokio::test]
    async fn cancelled_request_is_not_sent() {
        let mock = MockService::new();
        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            (),
            mock.clone(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = client
            .get("anything")
            .cancellation(cancel)
            .send()
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Canceled));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let mock = MockService::new();
        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            (),
            mock,
        );

        let response = client.get("missing").send().await.unwrap();
        let error = response.error_for_status().await.unwrap_err();
        assert_eq!(error.status, http::StatusCode::NOT_FOUND);
        assert_eq!(error.uri.to_string(), "http://registry.test/missing");
    }

    #[tokio::test]
    async fn transport_failure_names_the_uri() {
        let mut mock = MockService::new();
        mock.time_out(Method::GET, "/v2/_catalog");
        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            (),
            mock,
        );

        let error = client.get("v2/_catalog").send().await.unwrap_err();
        assert!(matches!(error, Error::Request { .. }));
        assert_eq!(
            error.uri().map(ToString::to_string).as_deref(),
            Some("http://registry.test/v2/_catalog")
        );
        assert_eq!(error.status(), None);
    }

    #[tokio::test]
    async fn request_timeout_names_the_uri() {
        #[derive(Debug, Clone)]
        struct Stalled;

        impl tower::Service<http::Request<hyperdriver::Body>> for Stalled {
            type Response = http::Response<hyperdriver::Body>;
            type Error = hyperdriver::client::Error;
            type Future = std::future::Pending<Result<Self::Response, Self::Error>>;

            fn poll_ready(
                &mut self,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<Result<(), Self::Error>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: http::Request<hyperdriver::Body>) -> Self::Future {
                std::future::pending()
            }
        }

        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            (),
            Stalled,
        );

        let error = client
            .get("v2/")
            .timeout(std::time::Duration::from_millis(10))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Request {
                source: hyperdriver::client::Error::RequestTimeout,
                ..
            }
        ));
        assert_eq!(
            error.uri().map(ToString::to_string).as_deref(),
            Some("http://registry.test/v2/")
        );
    }
}
