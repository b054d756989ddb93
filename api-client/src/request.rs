use std::time::Duration;

use bytes::Bytes;
use http::{header::HeaderValue, HeaderName, Uri};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::{response::ApiResponse, ApiClient, Authentication};

/// Copy the method, URI and headers of a request, without its body.
pub(crate) fn request_parts<B>(req: &http::Request<B>) -> http::request::Parts {
    let mut builder = http::Request::builder()
        .uri(req.uri().clone())
        .method(req.method().clone())
        .version(req.version());

    if let Some(headers) = builder.headers_mut() {
        *headers = req.headers().clone();
    }

    let (parts, _) = builder
        .body(())
        .expect("parts copied from a valid request")
        .into_parts();
    parts
}

/// Builder for a single request against an `ApiClient`.
#[derive(Debug)]
pub struct RequestBuilder<A> {
    req: http::request::Builder,
    client: ApiClient<A>,
    body: Option<hyperdriver::Body>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<A> RequestBuilder<A> {
    /// Start a request for `method` on `uri`.
    pub fn new(client: ApiClient<A>, uri: Uri, method: http::Method) -> Self {
        Self {
            req: http::Request::builder().method(method).uri(uri),
            client,
            body: None,
            timeout: None,
            cancel: None,
        }
    }

    /// Add a header to the request.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.req = self.req.header(key, value);
        self
    }

    /// Give up on the request after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the request as soon as `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the request body.
    pub fn body<B: Into<hyperdriver::Body>>(self, body: B) -> Self {
        Self {
            body: Some(body.into()),
            ..self
        }
    }

    /// Serialize `data` as the JSON request body.
    pub fn json<T: serde::Serialize + ?Sized>(self, data: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(data).map_err(Error::RequestBody)?;
        Ok(self
            .header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .body(hyperdriver::Body::from(Bytes::from(body))))
    }

    /// Assemble the request without sending it.
    pub fn build(self) -> Result<http::Request<hyperdriver::Body>, Error> {
        Ok(self
            .req
            .body(self.body.unwrap_or_else(hyperdriver::Body::empty))?)
    }

    /// Send the request.
    pub async fn send(self) -> Result<ApiResponse, Error>
    where
        A: Authentication,
    {
        let client = self.client.clone();
        let timeout = self.timeout;
        let cancel = self.cancel.clone().unwrap_or_default();
        let req = self.build()?;
        let uri = req.uri().clone();

        let exchange = client.execute_with_cancellation(req, &cancel);
        match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(res) => res,
                Err(_) => Err(Error::timed_out(uri)),
            },
            None => exchange.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::mock::MockService;
    use crate::{ApiClient, Error};

    #[test]
    fn unserializable_body_is_a_request_error() {
        let client = ApiClient::new_with_inner_service(
            "http://registry.test/".parse().unwrap(),
            (),
            MockService::new(),
        );

        let payload = BTreeMap::from([(vec![1u8], 1u8)]);
        let error = client.post("v2/users/login/").json(&payload).unwrap_err();
        assert!(matches!(error, Error::RequestBody(_)));
    }
}
