//! Paginated revision index reading.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{RateLimitedFetcher, WikiApi};
use crate::error::{AppError, Result};
use crate::models::{ContentRequest, RevisionIndexPage, RevisionMeta};
use crate::pipeline::{Counter, Metrics};

const STAGE: &str = "revision_index";

/// Lazy sequence of index pages for one page id, restartable from a
/// continuation token.
pub struct RevisionIndexReader {
    api: WikiApi,
    fetcher: Arc<RateLimitedFetcher>,
    page_id: u64,
    limit: usize,
    continuation: Option<String>,
    exhausted: bool,
}

impl RevisionIndexReader {
    pub fn new(api: WikiApi, fetcher: Arc<RateLimitedFetcher>, page_id: u64, limit: usize) -> Self {
        Self {
            api,
            fetcher,
            page_id,
            limit,
            continuation: None,
            exhausted: false,
        }
    }

    /// Start reading at the given continuation token instead of the beginning.
    pub fn resume_from(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }

    /// Token that would resume reading at the next unread page.
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next page, or `None` once the index is exhausted.
    ///
    /// Any non-success status or malformed payload is returned as an error;
    /// pages are never skipped.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RevisionMeta>>> {
        if self.exhausted {
            return Ok(None);
        }

        let url = self
            .api
            .index_url(self.page_id, self.limit, self.continuation.as_deref());
        let page: RevisionIndexPage = self.fetcher.get_json(STAGE, url).await?;

        let next = page.next_token();
        let revisions = page.into_revisions(STAGE)?;
        match next {
            Some(token) => self.continuation = Some(token),
            None => {
                self.continuation = None;
                self.exhausted = true;
            }
        }
        Ok(Some(revisions))
    }

    /// Drive the reader to exhaustion, pushing every item to both outputs.
    ///
    /// Items are sent in received order: content requests first, then the
    /// metadata for index persistence. Both senders are dropped on return so
    /// downstream stages observe end of input; on failure the token is
    /// cancelled first, so they never mistake a partial index for a full one.
    pub async fn run(
        mut self,
        content_tx: mpsc::Sender<ContentRequest>,
        index_tx: mpsc::Sender<RevisionMeta>,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Result<()> {
        log::info!("Reading revision index of page {}", self.page_id);
        let outcome = self
            .read_all(&content_tx, &index_tx, &cancel, &metrics)
            .await;
        if outcome.is_err() {
            cancel.cancel();
        }
        outcome
    }

    async fn read_all(
        &mut self,
        content_tx: &mpsc::Sender<ContentRequest>,
        index_tx: &mpsc::Sender<RevisionMeta>,
        cancel: &CancellationToken,
        metrics: &Metrics,
    ) -> Result<()> {
        loop {
            let page = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                page = self.next_page() => page?,
            };
            let Some(revisions) = page else { break };

            metrics.incr(Counter::PagesFetched);
            metrics.add(Counter::RevisionsIndexed, revisions.len() as u64);
            log::debug!(
                "Index page with {} revisions (continue: {:?})",
                revisions.len(),
                self.continuation
            );

            for meta in revisions {
                send(content_tx, meta.content_request(), cancel).await?;
                send(index_tx, meta, cancel).await?;
            }
        }

        log::info!("Revision index exhausted");
        Ok(())
    }
}

/// Send on a bounded channel, aborting on cancellation.
pub(crate) async fn send<T>(
    tx: &mpsc::Sender<T>,
    item: T,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        sent = tx.send(item) => sent.map_err(|_| AppError::Cancelled),
    }
}
