//! Authentication for API clients.
//!
//! The `Authentication` trait is applied to every request sent through an `ApiClient`.
//!
//! Implementations provided here:
//! - `BasicAuth` for Basic authentication
//! - `BearerAuth` for Bearer token authentication
//! - `SchemeAuth` for registry specific `Authorization: <scheme> <token>` headers
//! - `CredentialAuth`, chosen from a registry [Credential]
//! - `()` for no authentication

use std::sync::Arc;

use arc_swap::ArcSwap;
use credential::{Credential, CredentialType, Secret};
use http::HeaderValue;
use tower::layer::Layer;

/// Create a basic authentication header value, with the password being optional.
///
/// Basic authentication Base64 encodes the username and password, separated by a colon.
///
/// # Example
/// ```rust
/// use api_client::basic_auth;
///
/// let header = basic_auth("username", Some("password"));
/// assert_eq!(header.to_str().unwrap(), "Basic dXNlcm5hbWU6cGFzc3dvcmQ=");
/// ```
pub fn basic_auth<U, P>(username: U, password: Option<P>) -> HeaderValue
where
    U: std::fmt::Display,
    P: std::fmt::Display,
{
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{}:", username);
        if let Some(password) = password {
            let _ = write!(encoder, "{}", password);
        }
    }
    let mut header = HeaderValue::from_bytes(&buf).expect("base64 is always valid HeaderValue");
    header.set_sensitive(true);
    header
}

/// Authenticate requests sent by an `ApiClient`.
pub trait Authentication: Clone {
    /// Add whatever the remote expects to the outgoing request.
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B>;
}

fn set_authorization<B>(mut req: http::Request<B>, value: HeaderValue) -> http::Request<B> {
    if !req.headers().contains_key(http::header::AUTHORIZATION) {
        req.headers_mut()
            .append(http::header::AUTHORIZATION, value);
    } else {
        tracing::warn!("{} header already set", http::header::AUTHORIZATION);
    }
    req
}

/// Authentication with a bearer token.
///
/// # Example
/// ```rust
/// use api_client::BearerAuth;
///
/// let auth = BearerAuth::new("my-secret");
/// assert_eq!(auth.header_value().unwrap().to_str().unwrap(), "Bearer my-secret");
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth(Secret);

impl BearerAuth {
    /// Create a new Bearer authentication with a given token.
    pub fn new<K: Into<Secret>>(key: K) -> Self {
        BearerAuth(key.into())
    }

    /// Get the header value for the Bearer token.
    pub fn header_value(&self) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        self.0.bearer()
    }
}

impl Authentication for BearerAuth {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        match self.header_value() {
            Ok(value) => set_authorization(req, value),
            Err(_) => {
                tracing::warn!("bearer token is not a valid header value");
                req
            }
        }
    }
}

/// Basic authentication, with the password being optional.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: Option<Secret>,
}

impl BasicAuth {
    /// Create a new Basic authentication with a given username and optional password.
    pub fn new<U, P>(username: U, password: Option<P>) -> Self
    where
        U: Into<String>,
        P: Into<Secret>,
    {
        BasicAuth {
            username: username.into(),
            password: password.map(Into::into),
        }
    }
}

impl Authentication for BasicAuth {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        let value = basic_auth(&self.username, self.password.as_ref().map(Secret::revealed));
        set_authorization(req, value)
    }
}

/// An `Authorization: <scheme> <token>` header, for registries which
/// invent their own scheme (e.g. `JWT` or `Harbor-Secret`).
#[derive(Debug, Clone)]
pub struct SchemeAuth {
    scheme: &'static str,
    token: Secret,
}

impl SchemeAuth {
    /// Create a new scheme authentication.
    pub fn new<T: Into<Secret>>(scheme: &'static str, token: T) -> Self {
        Self {
            scheme,
            token: token.into(),
        }
    }
}

impl Authentication for SchemeAuth {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        match self.token.header(self.scheme) {
            Ok(value) => set_authorization(req, value),
            Err(_) => {
                tracing::warn!(scheme = self.scheme, "token is not a valid header value");
                req
            }
        }
    }
}

/// Authentication picked from a registry credential.
#[derive(Debug, Clone, Default)]
pub enum CredentialAuth {
    /// Send requests without an `Authorization` header.
    #[default]
    Anonymous,

    /// Username and password.
    Basic(BasicAuth),

    /// Bearer token.
    Bearer(BearerAuth),

    /// Custom scheme.
    Scheme(SchemeAuth),
}

impl CredentialAuth {
    /// Map a credential onto an authentication method.
    ///
    /// `secret_scheme` names the header scheme used for [CredentialType::Secret]
    /// credentials, which only some registries understand.
    pub fn from_credential(credential: Option<&Credential>, secret_scheme: &'static str) -> Self {
        match credential {
            None => CredentialAuth::Anonymous,
            Some(credential) => match credential.kind {
                CredentialType::Basic => CredentialAuth::Basic(BasicAuth::new(
                    credential.access_key.clone(),
                    Some(credential.access_secret.clone()),
                )),
                CredentialType::OAuth => {
                    CredentialAuth::Bearer(BearerAuth::new(credential.access_secret.clone()))
                }
                CredentialType::Secret => CredentialAuth::Scheme(SchemeAuth::new(
                    secret_scheme,
                    credential.access_secret.clone(),
                )),
            },
        }
    }

    /// True when requests go out without credentials.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, CredentialAuth::Anonymous)
    }
}

impl Authentication for CredentialAuth {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        match self {
            CredentialAuth::Anonymous => req,
            CredentialAuth::Basic(auth) => auth.authenticate(req),
            CredentialAuth::Bearer(auth) => auth.authenticate(req),
            CredentialAuth::Scheme(auth) => auth.authenticate(req),
        }
    }
}

impl Authentication for () {
    fn authenticate<B>(&self, req: http::Request<B>) -> http::Request<B> {
        req
    }
}

/// A layer to provide a swappable authentication mechanism.
///
/// This allows users to update the authentication mechanism without needing to recreate the client.
#[derive(Debug)]
pub struct AuthenticationLayer<A> {
    auth: Arc<ArcSwap<A>>,
}

impl<A> Clone for AuthenticationLayer<A> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
        }
    }
}

impl<A> AuthenticationLayer<A> {
    pub(crate) fn new(auth: Arc<ArcSwap<A>>) -> Self {
        Self { auth }
    }
}

impl<A, S> Layer<S> for AuthenticationLayer<A> {
    type Service = AuthenticationService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationService {
            inner,
            auth: self.auth.clone(),
        }
    }
}

/// A service to provide a swappable authentication mechanism.
#[derive(Debug)]
pub struct AuthenticationService<A, S> {
    inner: S,
    auth: Arc<ArcSwap<A>>,
}

impl<A, S: Clone> Clone for AuthenticationService<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<A, S, BIn, BOut> tower::Service<http::Request<BIn>> for AuthenticationService<A, S>
where
    A: Authentication,
    S: tower::Service<http::Request<BIn>, Response = http::Response<BOut>>,
    S::Future: Send + 'static,
{
    type Response = http::Response<BOut>;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<BIn>) -> Self::Future {
        let req = self.auth.load().authenticate(req);
        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(auth: &CredentialAuth) -> Option<String> {
        let req = auth.authenticate(http::Request::new(()));
        req.headers()
            .get(http::header::AUTHORIZATION)
            .map(|value| value.to_str().unwrap().to_owned())
    }

    #[test]
    fn credential_auth_headers() {
        let basic = Credential::basic("username", "password");
        assert_eq!(
            authorization(&CredentialAuth::from_credential(Some(&basic), "X")).as_deref(),
            Some("Basic dXNlcm5hbWU6cGFzc3dvcmQ=")
        );

        let oauth = Credential::new(CredentialType::OAuth, "", "token");
        assert_eq!(
            authorization(&CredentialAuth::from_credential(Some(&oauth), "X")).as_deref(),
            Some("Bearer token")
        );

        let secret = Credential::new(CredentialType::Secret, "", "shared");
        assert_eq!(
            authorization(&CredentialAuth::from_credential(
                Some(&secret),
                "Harbor-Secret"
            ))
            .as_deref(),
            Some("Harbor-Secret shared")
        );

        assert_eq!(
            authorization(&CredentialAuth::from_credential(None, "X")),
            None
        );
    }

    #[test]
    fn header_values_are_sensitive() {
        let auth = CredentialAuth::Bearer(BearerAuth::new("token"));
        let req = auth.authenticate(http::Request::new(()));
        assert!(req.headers()[http::header::AUTHORIZATION].is_sensitive());
    }
}
