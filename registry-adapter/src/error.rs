use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use tracing_error::SpanTrace;

/// Categorizes adapter errors by what the caller should do about them,
/// independent of which registry produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// The registry descriptor or adapter options are unusable.
    ///
    /// **Retryable:** No - fix the descriptor.
    InvalidConfig,

    /// A namespace or filter pattern uses a wildcard the adapter can't expand.
    ///
    /// **Retryable:** No - fix the pattern.
    BadPattern,

    /// No factory is registered for the requested registry type.
    ///
    /// **Retryable:** No.
    NotFound,

    /// A listing advertised more pages than the adapter will follow.
    ///
    /// **Retryable:** No - the remote is likely looping its page references.
    PaginationLimitExceeded,

    /// The remote could not be reached, or answered with a non-success status.
    ///
    /// **Retryable:** Maybe - see [AdapterError::is_retryable].
    Transport,

    /// The caller cancelled the operation.
    ///
    /// **Retryable:** No.
    Canceled,

    /// The repository name can't be addressed on this registry type.
    ///
    /// **Retryable:** No - fix the repository name.
    InvalidRepository,

    /// The remote answered with a payload that could not be decoded.
    ///
    /// **Retryable:** No - indicates an API mismatch.
    Decode,

    /// The registry type has no way to perform the requested operation.
    ///
    /// **Retryable:** No.
    Unsupported,
}

impl AdapterErrorKind {
    /// Returns whether this kind of error can be transient.
    ///
    /// This is advisory only, adapters never retry on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterErrorKind::Transport)
    }

    /// Returns whether this error indicates a fault in what the caller asked for.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            AdapterErrorKind::InvalidConfig
                | AdapterErrorKind::BadPattern
                | AdapterErrorKind::InvalidRepository
        )
    }
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterErrorKind::InvalidConfig => write!(f, "invalid config"),
            AdapterErrorKind::BadPattern => write!(f, "bad pattern"),
            AdapterErrorKind::NotFound => write!(f, "not found"),
            AdapterErrorKind::PaginationLimitExceeded => write!(f, "pagination limit exceeded"),
            AdapterErrorKind::Transport => write!(f, "transport error"),
            AdapterErrorKind::Canceled => write!(f, "canceled"),
            AdapterErrorKind::InvalidRepository => write!(f, "invalid repository"),
            AdapterErrorKind::Decode => write!(f, "decode error"),
            AdapterErrorKind::Unsupported => write!(f, "unsupported operation"),
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    /// Captured backtrace, subject to `RUST_BACKTRACE`.
    backtrace: Backtrace,

    /// Span context where the error was created.
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// An error returned by a registry adapter.
///
/// Carries the semantic [AdapterErrorKind], the adapter which failed, and
/// when known the URL and HTTP status involved, so the caller can pick a
/// retry policy without parsing messages.
///
/// # Example
///
/// ```rust
/// use registry_adapter::{AdapterError, AdapterErrorKind};
///
/// let error = AdapterError::builder("harbor", AdapterErrorKind::Transport, "bad gateway")
///     .url("https://harbor.example.com/api/v2.0/projects")
///     .status(http::StatusCode::BAD_GATEWAY)
///     .build();
/// assert!(error.is_retryable());
/// ```
#[derive(Debug)]
pub struct AdapterError {
    kind: AdapterErrorKind,
    adapter: &'static str,
    url: Option<String>,
    status: Option<StatusCode>,
    context: Option<String>,
    source: Box<dyn StdError + Send + Sync + 'static>,
    traces: Box<ErrorTrace>,
}

impl StdError for AdapterError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl AdapterError {
    /// Create a new adapter error with the minimum required information.
    ///
    /// For more control, use `AdapterError::builder()`.
    #[track_caller]
    pub fn new<E>(adapter: &'static str, kind: AdapterErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            adapter,
            url: None,
            status: None,
            context: None,
            source: error.into(),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder for an adapter error with URL, status or context.
    pub fn builder<E>(
        adapter: &'static str,
        kind: AdapterErrorKind,
        error: E,
    ) -> AdapterErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        AdapterErrorBuilder {
            kind,
            adapter,
            source: error.into(),
            url: None,
            status: None,
            context: None,
        }
    }

    /// Returns a boxed closure that creates an adapter error from a downstream error.
    ///
    /// ```rust
    /// use registry_adapter::{AdapterError, AdapterErrorKind};
    ///
    /// fn parse(page: &str) -> Result<u32, AdapterError> {
    ///     page.parse()
    ///         .map_err(AdapterError::with("docker-hub", AdapterErrorKind::Decode))
    /// }
    /// assert!(parse("two").is_err());
    /// ```
    pub fn with<E>(
        adapter: &'static str,
        kind: AdapterErrorKind,
    ) -> Box<dyn FnOnce(E) -> AdapterError + Send + Sync>
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Box::new(move |error: E| AdapterError::new(adapter, kind, error))
    }

    /// Returns a boxed closure that classifies an HTTP client error on behalf of `adapter`.
    pub fn client(adapter: &'static str) -> Box<dyn FnOnce(api_client::Error) -> AdapterError + Send + Sync> {
        Box::new(move |error| AdapterError::from_client(adapter, error))
    }

    /// Classify an HTTP client error.
    pub fn from_client(adapter: &'static str, error: api_client::Error) -> Self {
        let kind = match &error {
            api_client::Error::Response(_) | api_client::Error::Request { .. } => {
                AdapterErrorKind::Transport
            }
            api_client::Error::ResponseBody(_) => AdapterErrorKind::Decode,
            api_client::Error::Build(_) | api_client::Error::RequestBody(_) => {
                AdapterErrorKind::InvalidConfig
            }
            api_client::Error::Canceled => AdapterErrorKind::Canceled,
            api_client::Error::PaginationLimit { .. } => AdapterErrorKind::PaginationLimitExceeded,
        };

        let status = error.status();
        let url = error.uri().map(ToString::to_string);

        AdapterError {
            kind,
            adapter,
            url,
            status,
            context: None,
            source: Box::new(error),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// The caller cancelled the operation.
    pub fn canceled(adapter: &'static str) -> Self {
        AdapterError::new(adapter, AdapterErrorKind::Canceled, "operation cancelled")
    }

    /// Returns the error kind.
    pub fn kind(&self) -> AdapterErrorKind {
        self.kind
    }

    /// Returns the name of the adapter which failed.
    pub fn adapter(&self) -> &'static str {
        self.adapter
    }

    /// Returns the URL involved, if known.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns the HTTP status the remote answered with, if it answered.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Add context to an existing error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns whether retrying the same call could succeed.
    ///
    /// True for transport failures with no response, server errors,
    /// request timeouts and rate limiting.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
            && match self.status {
                None => true,
                Some(status) => {
                    status.is_server_error()
                        || status == StatusCode::REQUEST_TIMEOUT
                        || status == StatusCode::TOO_MANY_REQUESTS
                }
            }
    }

    /// Returns whether this error indicates a fault in what the caller asked for.
    pub fn is_client_fault(&self) -> bool {
        self.kind.is_client_fault()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl From<api_client::Error> for AdapterError {
    fn from(error: api_client::Error) -> Self {
        AdapterError::from_client("api-client", error)
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Adapter error [{}] from {}", self.kind, self.adapter)?;

        if let Some(url) = &self.url {
            write!(f, " (url: {})", url)?;
        }

        if let Some(status) = &self.status {
            write!(f, " (status: {})", status)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Builder for an [AdapterError] with optional context fields.
#[derive(Debug)]
pub struct AdapterErrorBuilder {
    kind: AdapterErrorKind,
    adapter: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    url: Option<String>,
    status: Option<StatusCode>,
    context: Option<String>,
}

impl AdapterErrorBuilder {
    /// Set the URL involved.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the HTTP status returned by the remote.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the `AdapterError`.
    #[track_caller]
    pub fn build(self) -> AdapterError {
        AdapterError {
            kind: self.kind,
            adapter: self.adapter,
            url: self.url,
            status: self.status,
            context: self.context,
            source: self.source,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}
