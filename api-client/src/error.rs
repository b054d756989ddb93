//! Error types for API Clients
use std::fmt;

use http::{StatusCode, Uri};
use thiserror::Error;

use crate::response::ApiResponse;

/// A boxed error which can cross threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error occured while sending or recieving an HTTP request
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a non-success status
    #[error(transparent)]
    Response(HttpResponseError),

    /// An error occured while recieving or decoding the response body
    #[error("Error reading response body: {0}")]
    ResponseBody(#[source] BoxError),

    /// An error occured while sending the request
    #[error("Sending request to {uri}: {source}")]
    Request {
        /// The URI which was requested
        uri: Uri,
        /// The transport failure
        #[source]
        source: hyperdriver::client::Error,
    },

    /// The request could not be assembled
    #[error("Building request: {0}")]
    Build(#[from] http::Error),

    /// The request body could not be serialized
    #[error("Encoding request body: {0}")]
    RequestBody(#[source] serde_json::Error),

    /// The caller cancelled the operation
    #[error("Request cancelled")]
    Canceled,

    /// A paginated listing advertised more pages than the client will follow
    #[error("Pagination exceeded {limit} pages at {uri}")]
    PaginationLimit {
        /// The page cap in force
        limit: usize,
        /// The next page which was not requested
        uri: Uri,
    },
}

impl From<HttpResponseError> for Error {
    fn from(error: HttpResponseError) -> Self {
        Error::Response(error)
    }
}

impl Error {
    /// A transport failure while requesting `uri`.
    pub fn request(uri: Uri, source: hyperdriver::client::Error) -> Self {
        Error::Request { uri, source }
    }

    /// The request to `uri` did not finish in time.
    pub fn timed_out(uri: Uri) -> Self {
        Error::request(uri, hyperdriver::client::Error::RequestTimeout)
    }

    /// The HTTP status returned by the server, if the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Response(response) => Some(response.status),
            _ => None,
        }
    }

    /// The URI involved in the failure, when it is known.
    pub fn uri(&self) -> Option<&Uri> {
        match self {
            Error::Response(response) => Some(&response.uri),
            Error::Request { uri, .. } => Some(uri),
            Error::PaginationLimit { uri, .. } => Some(uri),
            _ => None,
        }
    }
}

/// A server returned an error response
#[derive(Debug, Clone)]
pub struct HttpResponseError {
    /// The HTTP status code of the response
    pub status: StatusCode,

    /// The URI which was requested
    pub uri: Uri,

    /// The message body of the response
    pub message: String,
}

impl HttpResponseError {
    /// Create a new HTTP response error from a response
    pub async fn from_response(response: ApiResponse) -> Self {
        let status = response.status();
        let uri = response.uri().clone();
        let message = response
            .text()
            .await
            .unwrap_or_else(|err| format!("Failed to read response body: {}", err));

        Self {
            status,
            uri,
            message,
        }
    }
}

impl fmt::Display for HttpResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "HTTP {} response from {}: {}",
            self.status, self.uri, self.message
        )
    }
}

impl std::error::Error for HttpResponseError {}
