// src/pipeline/preprocess.rs

//! Preprocess pipeline: author resolution → bounded per-revision analysis →
//! ordered diffing and consolidated output.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Counter, Metrics, Pipeline, PipelineContext, StageGroup, StageTiming};
use crate::error::{AppError, Result};
use crate::models::{PreprocessConfig, ProcessContext, RevisionAnalysis, RevisionMeta};
use crate::services::{
    AuthorResolver, Cleaner, Differ, RateLimitedFetcher, UserAnalyzer, UserMetadataCache, WikiApi,
    send,
};
use crate::storage::DumpStorage;
use crate::utils::elapsed_ms;

/// Where the revisions to preprocess come from.
pub enum RevisionSource {
    /// A previously saved index file, processed oldest-first
    File(PathBuf),
    /// Revisions streamed by another stage, processed in arrival order
    Stream(mpsc::Receiver<RevisionMeta>),
}

impl RevisionSource {
    /// Exactly one of `file` and `stream` must be given.
    pub fn from_parts(
        file: Option<PathBuf>,
        stream: Option<mpsc::Receiver<RevisionMeta>>,
    ) -> Result<Self> {
        match (file, stream) {
            (Some(path), None) => Ok(Self::File(path)),
            (None, Some(rx)) => Ok(Self::Stream(rx)),
            (Some(_), Some(_)) => Err(AppError::config(
                "revision source: both an index file and a stream were given",
            )),
            (None, None) => Err(AppError::config(
                "revision source: neither an index file nor a stream was given",
            )),
        }
    }

    /// Feed revisions to the resolver until the source is exhausted.
    async fn run(
        self,
        output: mpsc::Sender<RevisionMeta>,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Result<()> {
        match self {
            Self::File(path) => {
                let mut revisions = DumpStorage::load_index_file(&path).await?;
                revisions.sort_by(|a, b| (a.timestamp, a.rev_id).cmp(&(b.timestamp, b.rev_id)));
                log::info!("Queueing {} revisions from {}", revisions.len(), path.display());
                for meta in revisions {
                    send(&output, meta, &cancel).await?;
                    metrics.incr(Counter::RevisionsQueued);
                }
            }
            Self::Stream(mut input) => loop {
                let meta = tokio::select! {
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                    meta = input.recv() => meta,
                };
                let Some(meta) = meta else { break };
                send(&output, meta, &cancel).await?;
                metrics.incr(Counter::RevisionsQueued);
            },
        }
        Ok(())
    }
}

/// Analysis of one revision, tagged with its position in the input.
struct Completed {
    seq: u64,
    /// `None` when the revision was abandoned on cancellation
    outcome: Option<(RevisionAnalysis, Option<String>)>,
}

/// Per-revision user analysis and cleaning.
struct AnalysisWorker {
    analyzer: UserAnalyzer,
    cleaner: Cleaner,
    metrics: Arc<Metrics>,
}

impl AnalysisWorker {
    async fn analyse(
        &self,
        context: ProcessContext,
        cancel: &CancellationToken,
    ) -> Option<(RevisionAnalysis, Option<String>)> {
        let mut analysis = RevisionAnalysis::new(context);

        let started = Instant::now();
        let tags = self.analyzer.analyse(&analysis.process.user);
        analysis.confidence = tags.confidence;
        for tag in tags.unknown {
            analysis.record_warning(format!("unknown author tag '{tag}'"));
        }
        self.metrics.incr(Counter::UsersAnalysed);
        self.metrics
            .record_timing(StageTiming::UserAnalysis, elapsed_ms(started));

        let started = Instant::now();
        let cleaned = self.cleaner.clean(&analysis.process.meta, cancel).await;
        self.metrics
            .record_timing(StageTiming::Cleaning, elapsed_ms(started));

        match cleaned {
            Ok(clean) => {
                self.metrics.incr(Counter::RevisionsCleaned);
                Some((analysis, Some(clean.content)))
            }
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                log::warn!("Cleaning revision {} failed: {e}", analysis.rev_id());
                analysis.record_error(e);
                Some((analysis, None))
            }
        }
    }
}

pub struct PreprocessPipeline {
    source: RevisionSource,
    api: WikiApi,
    fetcher: Arc<RateLimitedFetcher>,
    storage: DumpStorage,
    cleaner: Cleaner,
    config: PreprocessConfig,
}

impl PreprocessPipeline {
    pub fn new(
        source: RevisionSource,
        api: WikiApi,
        fetcher: Arc<RateLimitedFetcher>,
        storage: DumpStorage,
        cleaner: Cleaner,
        config: PreprocessConfig,
    ) -> Self {
        Self {
            source,
            api,
            fetcher,
            storage,
            cleaner,
            config,
        }
    }
}

#[async_trait]
impl Pipeline for PreprocessPipeline {
    fn name(&self) -> &'static str {
        "preprocess"
    }

    async fn run(self: Box<Self>, ctx: PipelineContext) -> Result<()> {
        let this = *self;
        let capacity = this.config.queue_capacity.max(1);
        let (meta_tx, meta_rx) = mpsc::channel(capacity);
        let (context_tx, context_rx) = mpsc::channel(capacity);
        let (done_tx, done_rx) = mpsc::channel(capacity);

        let cache = UserMetadataCache::load(&this.storage).await?;
        let resolver = AuthorResolver::new(
            this.api,
            this.fetcher,
            cache,
            this.config.user_batch_size,
            capacity,
        );
        let worker = Arc::new(AnalysisWorker {
            analyzer: UserAnalyzer::new(),
            cleaner: this.cleaner,
            metrics: Arc::clone(&ctx.metrics),
        });

        let mut stages = StageGroup::new(ctx.cancel.clone());
        stages.spawn(
            "revision_source",
            this.source
                .run(meta_tx, ctx.cancel.clone(), Arc::clone(&ctx.metrics)),
        );
        stages.spawn(
            "author_resolver",
            resolver.run(
                meta_rx,
                context_tx,
                this.storage.clone(),
                ctx.cancel.clone(),
                Arc::clone(&ctx.metrics),
            ),
        );
        stages.spawn(
            "analysis_dispatcher",
            dispatch(
                context_rx,
                done_tx,
                worker,
                this.config.max_concurrent,
                ctx.cancel.clone(),
            ),
        );
        stages.spawn(
            "sequencer",
            sequence(done_rx, this.storage, Arc::clone(&ctx.metrics)),
        );

        stages.join().await
    }
}

/// Fan revisions out to at most `limit` concurrent workers.
///
/// On cancellation no further revision is started; workers already running
/// finish and report before the stage returns.
async fn dispatch(
    mut input: mpsc::Receiver<ProcessContext>,
    output: mpsc::Sender<Completed>,
    worker: Arc<AnalysisWorker>,
    limit: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut workers: JoinSet<()> = JoinSet::new();
    let mut seq = 0u64;

    loop {
        let context = tokio::select! {
            _ = cancel.cancelled() => break,
            context = input.recv() => context,
        };
        let Some(context) = context else { break };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => {
                permit.map_err(|_| AppError::invariant("worker semaphore closed"))?
            }
        };

        let worker = Arc::clone(&worker);
        let output = output.clone();
        let cancel = cancel.clone();
        let position = seq;
        seq += 1;
        workers.spawn(async move {
            let outcome = worker.analyse(context, &cancel).await;
            drop(permit);
            // The sequencer drains until every sender is gone.
            let _ = output
                .send(Completed {
                    seq: position,
                    outcome,
                })
                .await;
        });

        while let Some(joined) = workers.try_join_next() {
            joined.map_err(|e| AppError::stage("analysis_worker", e))?;
        }
    }

    while let Some(joined) = workers.join_next().await {
        joined.map_err(|e| AppError::stage("analysis_worker", e))?;
    }
    log::info!("Dispatched {seq} revisions");

    if cancel.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}

/// Restore input order, diff in sequence, and write the consolidated output.
///
/// Drains until the dispatcher is gone, regardless of cancellation.
async fn sequence(
    mut input: mpsc::Receiver<Completed>,
    storage: DumpStorage,
    metrics: Arc<Metrics>,
) -> Result<()> {
    let mut differ = Differ::new();
    let mut parked: BTreeMap<u64, Option<(RevisionAnalysis, Option<String>)>> = BTreeMap::new();
    let mut next = 0u64;
    let mut records = Vec::new();

    while let Some(done) = input.recv().await {
        parked.insert(done.seq, done.outcome);
        while let Some(outcome) = parked.remove(&next) {
            next += 1;
            if let Some(outcome) = outcome {
                records.push(finish(outcome, &mut differ, &metrics).await?);
            }
        }
    }

    // Gaps remain only where a worker never reported.
    if !parked.is_empty() {
        log::warn!("{} revisions completed out of sequence", parked.len());
    }
    for outcome in parked.into_values().flatten() {
        records.push(finish(outcome, &mut differ, &metrics).await?);
    }

    storage.write_analysis(&records).await?;
    log::info!("Wrote {} analysis records", records.len());
    Ok(())
}

/// Diffing is CPU bound, so the differ moves onto the blocking pool for the
/// duration of one comparison and comes back with the new previous text.
async fn finish(
    (mut analysis, clean_text): (RevisionAnalysis, Option<String>),
    differ: &mut Differ,
    metrics: &Metrics,
) -> Result<RevisionAnalysis> {
    if let Some(text) = clean_text {
        let started = Instant::now();
        let mut moved = std::mem::take(differ);
        let (moved, diffs) = tokio::task::spawn_blocking(move || {
            let diffs = moved.diff(&text);
            (moved, diffs)
        })
        .await
        .map_err(|e| AppError::stage("differ", e))?;
        *differ = moved;
        analysis.diffs = diffs;
        metrics.record_timing(StageTiming::Diffing, elapsed_ms(started));
        metrics.incr(Counter::RevisionsDiffed);
    }
    if analysis.has_errors() {
        metrics.incr(Counter::RevisionsFailed);
    }
    metrics.incr(Counter::RevisionsProcessed);
    Ok(analysis)
}
