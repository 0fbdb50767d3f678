// src/pipeline/scrape.rs

//! Scrape pipeline: index reading → content batching/fetching → persistence.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Pipeline, PipelineContext, StageGroup};
use crate::error::{AppError, Result};
use crate::models::{Config, RevisionMeta, ScraperConfig};
use crate::services::{ContentFetcher, RateLimitedFetcher, RevisionIndexReader, WikiApi};
use crate::storage::DumpStorage;

pub struct ScrapePipeline {
    api: WikiApi,
    fetcher: Arc<RateLimitedFetcher>,
    storage: DumpStorage,
    page_id: u64,
    config: ScraperConfig,
}

impl ScrapePipeline {
    pub fn new(
        api: WikiApi,
        fetcher: Arc<RateLimitedFetcher>,
        storage: DumpStorage,
        page_id: u64,
        config: ScraperConfig,
    ) -> Self {
        Self {
            api,
            fetcher,
            storage,
            page_id,
            config,
        }
    }

    /// Resolve the configured title and lay out its document directory.
    ///
    /// Fails before any harvesting when the page does not exist.
    pub async fn prepare(config: &Config, fetcher: Arc<RateLimitedFetcher>) -> Result<Self> {
        let api = WikiApi::from_config(&config.api)?;
        let response = api.resolve_title(&fetcher, &config.scraper.title).await?;
        let page_id = response.page()?.page_id;

        let storage = DumpStorage::new(config.document_dir());
        storage.ensure_layout().await?;
        storage.save_page_meta(&response).await?;
        if let Some(marker) = storage.read_marker().await? {
            log::info!(
                "Previous run stopped after revision {}; stored revisions will be skipped",
                marker.rev_id
            );
        }

        Ok(Self::new(
            api,
            fetcher,
            storage,
            page_id,
            config.scraper.clone(),
        ))
    }

    pub fn storage(&self) -> &DumpStorage {
        &self.storage
    }
}

#[async_trait]
impl Pipeline for ScrapePipeline {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn run(self: Box<Self>, ctx: PipelineContext) -> Result<()> {
        let this = *self;
        let (content_tx, content_rx) = mpsc::channel(this.config.id_queue_capacity.max(1));
        let (index_tx, index_rx) = mpsc::channel(this.config.id_queue_capacity.max(1));
        let (batch_tx, batch_rx) = mpsc::channel(this.config.batch_queue_capacity.max(1));

        let mut stages = StageGroup::new(ctx.cancel.clone());

        let reader = RevisionIndexReader::new(
            this.api.clone(),
            Arc::clone(&this.fetcher),
            this.page_id,
            this.config.index_page_limit,
        );
        stages.spawn(
            "index_reader",
            reader.run(content_tx, index_tx, ctx.cancel.clone(), Arc::clone(&ctx.metrics)),
        );

        let content = ContentFetcher::new(
            this.api,
            this.fetcher,
            this.storage.clone(),
            this.config.content_batch_size,
        );
        stages.spawn(
            "content_fetcher",
            content.run_batches(content_rx, batch_tx, ctx.cancel.clone(), Arc::clone(&ctx.metrics)),
        );
        stages.spawn(
            "content_persister",
            ContentFetcher::run_persist(this.storage.clone(), batch_rx),
        );
        stages.spawn(
            "index_writer",
            write_index(this.storage, index_rx, ctx.cancel.clone()),
        );

        stages.join().await
    }
}

/// Stream index entries into the index file until the reader stops.
///
/// The index only replaces the previous one when the reader ran to the end;
/// after cancellation or a failure the partial listing is discarded.
async fn write_index(
    storage: DumpStorage,
    mut entries: mpsc::Receiver<RevisionMeta>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut writer = storage.index_writer().await?;
    while let Some(meta) = entries.recv().await {
        writer.append(&meta).await?;
    }

    if cancel.is_cancelled() {
        let count = writer.discard().await?;
        log::warn!("Index incomplete, discarded {count} entries; previous index kept");
        return Err(AppError::Cancelled);
    }
    let count = writer.finish().await?;
    log::info!("Wrote {count} index entries to {}", storage.index_path().display());
    Ok(())
}
