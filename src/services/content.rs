//! Batched revision content fetching and raw persistence.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{RateLimitedFetcher, WikiApi};
use crate::error::{AppError, Result};
use crate::models::{ContentBatch, ContentRequest, ContinuationMarker, RevisionContent};
use crate::pipeline::{Counter, Metrics};
use crate::storage::DumpStorage;

const STAGE: &str = "content";

pub struct ContentFetcher {
    api: WikiApi,
    fetcher: Arc<RateLimitedFetcher>,
    storage: DumpStorage,
    batch_size: usize,
}

impl ContentFetcher {
    pub fn new(
        api: WikiApi,
        fetcher: Arc<RateLimitedFetcher>,
        storage: DumpStorage,
        batch_size: usize,
    ) -> Self {
        Self {
            api,
            fetcher,
            storage,
            batch_size: batch_size.max(1),
        }
    }

    /// Fetch the full content of one batch of revisions.
    ///
    /// Continuation tokens in the response are followed until the batch is
    /// complete; each follow-up is a separate rate-limited request.
    pub async fn fetch_batch(
        &self,
        rev_ids: &[u64],
        metrics: &Metrics,
    ) -> Result<Vec<RevisionContent>> {
        let mut revisions = Vec::with_capacity(rev_ids.len());
        let mut continuation: Option<String> = None;

        loop {
            let url = self.api.content_url(rev_ids, continuation.as_deref());
            let batch: ContentBatch = self.fetcher.get_json(STAGE, url).await?;
            metrics.incr(Counter::ContentRequests);

            continuation = batch.next_token();
            revisions.extend(batch.into_revisions(STAGE)?);
            if continuation.is_none() {
                break;
            }
            log::debug!("Content batch truncated, continuing at {continuation:?}");
        }

        metrics.add(Counter::RevisionsFetched, revisions.len() as u64);
        Ok(revisions)
    }

    /// Group incoming requests into batches and fetch each one.
    ///
    /// Revisions already stored are skipped. A partial final batch is
    /// flushed when the input ends; after cancellation no new batch is
    /// started and the partial batch is dropped.
    pub async fn run_batches(
        self,
        mut requests: mpsc::Receiver<ContentRequest>,
        batches: mpsc::Sender<Vec<RevisionContent>>,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Result<()> {
        let mut pending: Vec<u64> = Vec::with_capacity(self.batch_size);

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                request = requests.recv() => request,
            };

            match request {
                Some(request) => {
                    if self.storage.has_raw(&request.storage_name()).await? {
                        metrics.incr(Counter::RevisionsSkipped);
                        continue;
                    }
                    pending.push(request.rev_id);
                    if pending.len() >= self.batch_size {
                        self.flush(&mut pending, &batches, &cancel, &metrics).await?;
                    }
                }
                None => {
                    if !pending.is_empty() {
                        self.flush(&mut pending, &batches, &cancel, &metrics).await?;
                    }
                    break;
                }
            }
        }

        log::info!("Content fetching finished");
        Ok(())
    }

    async fn flush(
        &self,
        pending: &mut Vec<u64>,
        batches: &mpsc::Sender<Vec<RevisionContent>>,
        cancel: &CancellationToken,
        metrics: &Metrics,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let ids = std::mem::take(pending);
        let revisions = self.fetch_batch(&ids, metrics).await?;
        log::debug!("Fetched {} of {} requested revisions", revisions.len(), ids.len());
        // The persister drains regardless of cancellation, so a fetched batch is never dropped.
        batches
            .send(revisions)
            .await
            .map_err(|_| AppError::invariant("content persister stopped before input ended"))
    }

    /// Persist fetched batches until the batch queue closes.
    ///
    /// Does not observe cancellation: batches already fetched are always
    /// written before the stage ends.
    pub async fn run_persist(
        storage: DumpStorage,
        mut batches: mpsc::Receiver<Vec<RevisionContent>>,
    ) -> Result<()> {
        let mut written = 0usize;
        while let Some(batch) = batches.recv().await {
            for revision in &batch {
                storage.write_raw(revision).await?;
                written += 1;
            }
            if let Some(last) = batch.last() {
                storage
                    .write_marker(ContinuationMarker {
                        rev_id: last.rev_id,
                        parent_id: last.parent_id,
                    })
                    .await?;
            }
        }
        log::info!("Persisted {written} raw revisions");
        Ok(())
    }
}
