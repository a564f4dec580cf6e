//! Shared types and streaming infrastructure for the YouTube API client.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

/// One page of a YouTube list response.
#[derive(Debug)]
pub struct Page<T> {
    pub items: VecDeque<T>,
    /// Absent on the last page.
    pub next_page_token: Option<String>,
}

type PendingPage<'a, F, T> = Pin<Box<dyn Future<Output = eyre::Result<(F, Page<T>)>> + Send + 'a>>;

/// A paginated stream over a YouTube API list endpoint.
///
/// Items are yielded one at a time. The next page is only requested once the
/// current one has been drained, and the stream ends after the first page
/// without a `nextPageToken`. It is single-pass: there is no way to rewind,
/// and an error fetching a page ends the stream after that error is yielded.
pub struct PagedStream<'a, T, F> {
    /// Items of the most recent page not yet handed out.
    buffered: VecDeque<T>,
    /// The request for the next page, if there is one.
    pending: Option<PendingPage<'a, F, T>>,
    pages_fetched: usize,
}

impl<'a, T, F> PagedStream<'a, T, F> {
    /// Creates the stream; `fetcher` is called with `None` for the first page
    /// and with the previous page's token for every later one.
    pub fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut,
        F: Send + 'a,
        Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
    {
        let first_page = async move {
            let page = fetcher(None).await?;
            Ok((fetcher, page))
        };
        Self {
            buffered: VecDeque::new(),
            pending: Some(Box::pin(first_page)),
            pages_fetched: 0,
        }
    }
}

impl<'a, T: Unpin, F, Fut> Stream for PagedStream<'a, T, F>
where
    F: Fn(Option<String>) -> Fut,
    F: Send + 'a,
    Fut: Future<Output = eyre::Result<Page<T>>> + Send + 'a,
{
    type Item = eyre::Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            let Some(pending) = self.pending.as_mut() else {
                return Poll::Ready(None);
            };

            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.pending = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Ok((fetcher, page))) => {
                    self.pages_fetched += 1;
                    tracing::trace!(
                        page = self.pages_fetched,
                        items = page.items.len(),
                        last = page.next_page_token.is_none(),
                        "received page"
                    );
                    self.buffered.extend(page.items);
                    self.pending = match page.next_page_token {
                        Some(token) => Some(Box::pin(async move {
                            let page = fetcher(Some(token)).await?;
                            Ok((fetcher, page))
                        })),
                        None => None,
                    };
                }
            }
        }
    }
}

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults")]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
}
