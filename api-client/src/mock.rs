//! A canned-response service for testing clients without a network.

use bytes::Bytes;
use http::{response, HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A response served by [MockService].
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl MockResponse {
    /// A canned response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Respond(MockResponse),
    TimedOut,
}

/// A request seen by [MockService].
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// The request method.
    pub method: Method,
    /// The request path, including the query string.
    pub path: String,
    /// The request headers, after authentication was applied.
    pub headers: HeaderMap,
}

type Route = (Method, String);

/// Serves configured responses by method and path.
///
/// A route registered with a query string only matches that exact query;
/// a route without one matches any query. Unknown routes get a 404.
///
/// A route may hold a sequence of replies: each request takes the next one,
/// and the last reply repeats once the sequence is used up.
#[derive(Debug, Default, Clone)]
pub struct MockService {
    routes: HashMap<Route, Vec<Reply>>,
    hits: Arc<Mutex<HashMap<Route, usize>>>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockService {
    /// An empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `method` on `path`, replacing any earlier replies.
    pub fn add(
        &mut self,
        method: Method,
        path: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    ) {
        let reply = Reply::Respond(MockResponse::new(status, headers, body));
        self.routes.insert((method, path.to_owned()), vec![reply]);
    }

    /// Queue `body` as the next reply for `method` on `path`.
    pub fn then(
        &mut self,
        method: Method,
        path: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    ) {
        let reply = Reply::Respond(MockResponse::new(status, headers, body));
        self.routes
            .entry((method, path.to_owned()))
            .or_default()
            .push(reply);
    }

    /// Fail every request for `method` on `path` with a transport timeout.
    pub fn time_out(&mut self, method: Method, path: &str) {
        self.routes
            .insert((method, path.to_owned()), vec![Reply::TimedOut]);
    }

    /// Serve a `200 OK` JSON body for `GET` on `path`.
    pub fn json(&mut self, path: &str, mut headers: HeaderMap, body: &str) {
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        self.add(
            Method::GET,
            path,
            StatusCode::OK,
            headers,
            body.as_bytes().to_vec(),
        );
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    fn reply(&self, route: Route) -> Option<Reply> {
        let replies = self.routes.get(&route)?;
        let mut hits = self.hits.lock();
        let seen = hits.entry(route).or_default();
        let reply = replies.get(*seen).or_else(|| replies.last()).cloned();
        *seen += 1;
        reply
    }
}

impl tower::Service<http::Request<hyperdriver::Body>> for MockService {
    type Response = http::Response<hyperdriver::Body>;
    type Error = hyperdriver::client::Error;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<hyperdriver::Body>) -> Self::Future {
        let method = req.method().clone();
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned());

        self.requests.lock().push(MockRequest {
            method: method.clone(),
            path: path.clone(),
            headers: req.headers().clone(),
        });

        let reply = self
            .reply((method.clone(), path.clone()))
            .or_else(|| self.reply((method.clone(), req.uri().path().to_owned())));

        let response = match reply {
            Some(Reply::Respond(response)) => response,
            Some(Reply::TimedOut) => {
                return std::future::ready(Err(hyperdriver::client::Error::RequestTimeout))
            }
            None => {
                tracing::trace!(%method, %path, "no mock response configured");
                MockResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), Vec::new())
            }
        };

        let mut builder = response::Builder::new()
            .status(response.status)
            .version(http::Version::HTTP_11);

        for (key, value) in response.headers.iter() {
            builder = builder.header(key, value);
        }

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(response.body)
        };

        std::future::ready(
            builder
                .body(hyperdriver::Body::from(body))
                .map_err(|error| hyperdriver::client::Error::Service(error.into())),
        )
    }
}
