//! URI utilities.

use camino::Utf8Path;
use http::Uri;
use thiserror::Error;
use url::Url;

/// Errors that can occur when parsing a base URI.
#[derive(Debug, Error)]
pub enum ParseUriError {
    /// An error occurred while parsing the URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// The URL cannot be a base URL (e.g. `mailto:`).
    #[error("cannot be a base URL: {0}")]
    CannotBeABase(Url),

    /// Only `http` and `https` are spoken here.
    #[error("unsupported scheme: {0}")]
    Scheme(String),

    /// The URI is invalid, but URL parsing succeded.
    #[error("invalid URI: {0}")]
    Invalid(#[from] http::uri::InvalidUri),
}

/// Parse a string as the base URI of an HTTP API.
///
/// ```rust
/// let uri = api_client::uri::parse_base("https://harbor.example.com").unwrap();
/// assert_eq!(uri.host(), Some("harbor.example.com"));
/// ```
pub fn parse_base(base: &str) -> Result<Uri, ParseUriError> {
    let url: Url = base.trim().parse()?;
    if url.cannot_be_a_base() {
        return Err(ParseUriError::CannotBeABase(url));
    }

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ParseUriError::Scheme(url.scheme().to_owned()));
    }

    Ok(url.as_str().parse()?)
}

/// Extension trait for URIs.
pub trait UriExtension {
    /// Join a path to a URI.
    fn join<P: AsRef<str>>(self, path: P) -> Uri;

    /// Resolve a reference found in a response (a `Link` header target or a
    /// `next` field) against this URI.
    ///
    /// Absolute references are used as-is, origin-relative references keep this
    /// URI's scheme and authority. Anything else is `None`.
    fn resolve(&self, reference: &str) -> Option<Uri>;
}

impl UriExtension for Uri {
    fn join<P: AsRef<str>>(self, path: P) -> Uri {
        let mut parts = self.into_parts();

        parts.path_and_query = parts.path_and_query.as_ref().map(|pq| {
            let joined = Utf8Path::new(pq.path()).join(path.as_ref());
            http::uri::PathAndQuery::from_maybe_shared(joined.to_string()).unwrap()
        });
        Uri::from_parts(parts).unwrap()
    }

    fn resolve(&self, reference: &str) -> Option<Uri> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        let target: Uri = reference.parse().ok()?;
        if target.scheme().is_some() {
            return target.authority().is_some().then_some(target);
        }

        if !reference.starts_with('/') || target.authority().is_some() {
            return None;
        }

        let mut parts = self.clone().into_parts();
        parts.path_and_query = target.path_and_query().cloned();
        Uri::from_parts(parts).ok()
    }
}
