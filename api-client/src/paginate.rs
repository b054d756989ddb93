//! Follow paginated listings until the server stops advertising a next page.
//!
//! A [Paginated] stream issues the initial request, decodes each page with a
//! [Paginator], yields the page's items in server order, and then follows the
//! next-page reference the page advertised. An absent or malformed reference
//! ends the stream normally. The number of pages followed is capped, and the
//! stream stops at once when its cancellation token fires.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::{future::BoxFuture, FutureExt, TryStreamExt as _};
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Error};
use crate::uri::UriExtension as _;

/// Default cap on the number of pages a listing may span.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Where a page says the listing continues.
pub trait PaginationInfo {
    /// Get the total number of pages, when the server reports it.
    fn pages(&self) -> Option<usize> {
        None
    }

    /// Get the current page number, when the server reports it.
    fn page(&self) -> Option<usize> {
        None
    }

    /// The URI of the next page, resolved against the URI of this page.
    fn next(&self, current: &Uri) -> Option<Uri>;
}

/// One decoded page of a paginated listing.
pub trait Paginator: PaginationInfo + Sized {
    /// The type of item that the paginator will return
    type Item;

    /// Decode a page from the response head and its collected body.
    fn from_response(head: &http::response::Parts, body: Bytes) -> Result<Self, BoxError>;

    /// Take all items in this page
    fn items(&mut self) -> Vec<Self::Item>;
}

/// A JSON response body holding the items of one page.
pub trait PageBody: DeserializeOwned {
    /// The type of item listed in the body.
    type Item;

    /// Unwrap the listed items, in order.
    fn into_items(self) -> Vec<Self::Item>;
}

impl<T> PageBody for Vec<T>
where
    T: DeserializeOwned,
{
    type Item = T;

    fn into_items(self) -> Vec<Self::Item> {
        self
    }
}

/// A page whose continuation is advertised in an RFC 8288 `Link` header with
/// `rel="next"`, as Harbor and the distribution API do.
pub struct LinkPaginated<B: PageBody> {
    items: Vec<B::Item>,
    next: Option<String>,
}

impl<B: PageBody> fmt::Debug for LinkPaginated<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkPaginated")
            .field("items", &self.items.len())
            .field("next", &self.next)
            .finish()
    }
}

impl<B: PageBody> PaginationInfo for LinkPaginated<B> {
    fn next(&self, current: &Uri) -> Option<Uri> {
        let reference = self.next.as_deref()?;
        let next = current.resolve(reference);
        if next.is_none() {
            tracing::debug!(%reference, "ignoring unusable next link");
        }
        next
    }
}

impl<B: PageBody> Paginator for LinkPaginated<B> {
    type Item = B::Item;

    fn from_response(head: &http::response::Parts, body: Bytes) -> Result<Self, BoxError> {
        let body: B = serde_json::from_slice(&body)?;
        Ok(Self {
            items: body.into_items(),
            next: next_link(&head.headers),
        })
    }

    fn items(&mut self) -> Vec<Self::Item> {
        std::mem::take(&mut self.items)
    }
}

/// Find the `rel="next"` target among the `Link` headers.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(http::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|link| {
            let link = link.trim();
            let rest = link.strip_prefix('<')?;
            let (target, params) = rest.split_once('>')?;
            params
                .split(';')
                .filter_map(|param| param.trim().split_once('='))
                .any(|(key, value)| {
                    key.trim().eq_ignore_ascii_case("rel")
                        && value
                            .trim()
                            .trim_matches('"')
                            .split_ascii_whitespace()
                            .any(|rel| rel.eq_ignore_ascii_case("next"))
                })
                .then(|| target.trim().to_owned())
        })
}

type NextPageFuture<P> = BoxFuture<'static, Result<P, Error>>;

enum PaginatedStreamState<T, P> {
    Query,
    Buffered(VecDeque<T>),
    Requesting(NextPageFuture<P>),
    Done,
}

/// A stream of items collected from a paginated API listing.
///
/// The type `A` should implement the `Authentication` trait, and the type `P` decodes
/// each page and says where the next one is.
#[pin_project::pin_project]
pub struct Paginated<A, P: Paginator> {
    client: crate::ApiClient<A>,
    method: Method,
    headers: HeaderMap,
    current: Option<Uri>,
    next: Option<Uri>,
    cancel: CancellationToken,
    max_pages: usize,
    pages: usize,
    timeout: Option<Duration>,
    state: PaginatedStreamState<P::Item, P>,
}

impl<A: fmt::Debug, P: Paginator> fmt::Debug for Paginated<A, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginated")
            .field("client", &self.client)
            .field("next", &self.next)
            .field("pages", &self.pages)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl<A, P: Paginator> Paginated<A, P> {
    /// Create a new paginated stream from an API client and the request for the first page.
    ///
    /// Subsequent pages reuse the method and headers of this request, with an empty body.
    pub fn new(client: crate::ApiClient<A>, request: http::Request<hyperdriver::Body>) -> Self {
        let (parts, _) = request.into_parts();
        Self {
            client,
            method: parts.method,
            headers: parts.headers,
            current: None,
            next: Some(parts.uri),
            cancel: CancellationToken::new(),
            max_pages: DEFAULT_MAX_PAGES,
            pages: 0,
            timeout: None,
            state: PaginatedStreamState::Query,
        }
    }

    /// Cap the number of pages which will be requested.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Give up on any single page request after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop requesting pages once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<A, P> Paginated<A, P>
where
    A: crate::Authentication + Send + Sync + 'static,
    P: Paginator + Send + 'static,
    P::Item: Send + 'static,
{
    /// Drain every page, returning all items in server order.
    pub async fn collect_all(self) -> Result<Vec<P::Item>, Error> {
        self.try_collect().await
    }
}

impl<A, P> futures::Stream for Paginated<A, P>
where
    A: crate::Authentication + Send + Sync + 'static,
    P: Paginator + Send + 'static,
    P::Item: Send + 'static,
{
    type Item = Result<P::Item, Error>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.project();
        match this.state {
            PaginatedStreamState::Query => {
                let Some(uri) = this.next.take() else {
                    tracing::trace!("No more pages to request, stream is done");
                    *this.state = PaginatedStreamState::Done;
                    return std::task::Poll::Ready(None);
                };

                if this.cancel.is_cancelled() {
                    tracing::debug!(%uri, "pagination cancelled");
                    *this.state = PaginatedStreamState::Done;
                    return std::task::Poll::Ready(Some(Err(Error::Canceled)));
                }

                if *this.pages >= *this.max_pages {
                    tracing::warn!(%uri, limit = *this.max_pages, "pagination limit reached");
                    *this.state = PaginatedStreamState::Done;
                    return std::task::Poll::Ready(Some(Err(Error::PaginationLimit {
                        limit: *this.max_pages,
                        uri,
                    })));
                }

                let mut builder = http::Request::builder()
                    .method(this.method.clone())
                    .uri(uri.clone());
                if let Some(headers) = builder.headers_mut() {
                    *headers = this.headers.clone();
                }

                let request = match builder.body(hyperdriver::Body::empty()) {
                    Ok(request) => request,
                    Err(error) => {
                        *this.state = PaginatedStreamState::Done;
                        return std::task::Poll::Ready(Some(Err(Error::Build(error))));
                    }
                };

                tracing::trace!("Requesting page {}: {:?}", *this.pages + 1, uri);
                *this.current = Some(uri);

                let client = this.client.clone();
                let cancel = this.cancel.clone();
                let timeout = *this.timeout;
                let uri = request.uri().clone();

                let next_future: NextPageFuture<P> = Box::pin(async move {
                    let exchange = client.execute_with_cancellation(request, &cancel);
                    let response = match timeout {
                        Some(timeout) => tokio::time::timeout(timeout, exchange)
                            .await
                            .map_err(|_| Error::timed_out(uri))??,
                        None => exchange.await?,
                    };
                    let response = response.error_for_status().await?;
                    let (_, head, body) = response.into_parts();

                    let bytes = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Canceled),
                        bytes = crate::response::collect(body) => bytes?,
                    };

                    P::from_response(&head, bytes).map_err(Error::ResponseBody)
                });

                *this.state = PaginatedStreamState::Requesting(next_future);
                cx.waker().wake_by_ref();
                std::task::Poll::Pending
            }
            PaginatedStreamState::Buffered(ref mut items) => {
                if let Some(item) = items.pop_front() {
                    std::task::Poll::Ready(Some(Ok(item)))
                } else {
                    tracing::trace!("Buffer is empty, requesting next page");
                    *this.state = PaginatedStreamState::Query;
                    cx.waker().wake_by_ref();
                    std::task::Poll::Pending
                }
            }
            PaginatedStreamState::Requesting(ref mut future) => match future.poll_unpin(cx) {
                std::task::Poll::Ready(Ok(mut paginator)) => {
                    *this.pages += 1;
                    tracing::trace!(
                        "Paginated request on page {} of {}",
                        paginator.page().unwrap_or(*this.pages),
                        paginator.pages().unwrap_or(0)
                    );

                    *this.next = this
                        .current
                        .as_ref()
                        .and_then(|current| paginator.next(current));
                    *this.state = PaginatedStreamState::Buffered(VecDeque::from(paginator.items()));
                    cx.waker().wake_by_ref();
                    std::task::Poll::Pending
                }
                std::task::Poll::Ready(Err(error)) => {
                    *this.state = PaginatedStreamState::Done;
                    std::task::Poll::Ready(Some(Err(error)))
                }
                std::task::Poll::Pending => std::task::Poll::Pending,
            },
            PaginatedStreamState::Done => std::task::Poll::Ready(None),
        }
    }
}
