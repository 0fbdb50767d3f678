// src/pipeline/supervisor.rs

//! Stage groups and the pipeline supervisor.
//!
//! A pipeline is a fixed set of long-lived stages joined by bounded queues.
//! Its stages run in a [`StageGroup`]: the first stage to fail cancels its
//! siblings, and that error is what the group reports. Cooperative shutdown
//! (`AppError::Cancelled`) is never reported as a failure.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::{Metrics, MetricsSnapshot};
use crate::error::{AppError, Result};

/// Task group with first-error-wins failure policy.
pub struct StageGroup {
    cancel: CancellationToken,
    tasks: JoinSet<Result<()>>,
}

impl StageGroup {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: JoinSet::new(),
        }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a named stage; its failure cancels the whole group.
    pub fn spawn<F>(&mut self, name: &'static str, stage: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            log::debug!("{name} started");
            let result = stage.await;
            match &result {
                Ok(()) => log::info!("{name} stopped"),
                Err(e) if e.is_cancelled() => log::info!("{name} stopped (cancelled)"),
                Err(e) => {
                    log::error!("{name} stopped: {e}");
                    cancel.cancel();
                }
            }
            result
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every stage and return the first real failure.
    pub async fn join(mut self) -> Result<()> {
        let mut first: Option<AppError> = None;
        while let Some(joined) = self.tasks.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) if e.is_cancelled() => continue,
                Ok(Err(e)) => e,
                Err(join_error) => {
                    self.cancel.cancel();
                    AppError::stage("stage_group", join_error)
                }
            };
            if first.is_none() {
                first = Some(error);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Shared handles a pipeline receives when launched.
#[derive(Clone)]
pub struct PipelineContext {
    pub cancel: CancellationToken,
    pub metrics: Arc<Metrics>,
}

/// A set of stages that runs as one independently stoppable unit.
#[async_trait]
pub trait Pipeline: Send + 'static {
    fn name(&self) -> &'static str;

    /// Run every stage to completion or cancellation.
    async fn run(self: Box<Self>, ctx: PipelineContext) -> Result<()>;
}

struct RunningPipeline {
    name: &'static str,
    task: JoinHandle<Result<()>>,
}

/// Owns the cancellation context, the metrics, and every running pipeline.
pub struct PipelineSupervisor {
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
    running: Vec<RunningPipeline>,
}

impl Default for PipelineSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSupervisor {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            metrics: Arc::new(Metrics::new()),
            running: Vec::new(),
        }
    }

    /// Root cancellation signal; cancelling it stops every pipeline.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Launch a pipeline.
    ///
    /// Returns the pipeline's own cancellation token: cancelling it stops
    /// that pipeline only.
    pub fn run<P: Pipeline>(&mut self, pipeline: P) -> CancellationToken {
        let cancel = self.cancel.child_token();
        let ctx = PipelineContext {
            cancel: cancel.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        let name = pipeline.name();
        self.metrics.mark_started();

        log::info!("Starting {name} pipeline");
        let task = tokio::spawn(Box::new(pipeline).run(ctx));
        self.running.push(RunningPipeline { name, task });
        cancel
    }

    /// Wait for every running pipeline to finish.
    ///
    /// A failing pipeline cancels the others; the first failure is returned.
    pub async fn wait(&mut self) -> Result<()> {
        let mut first: Option<AppError> = None;
        for pipeline in self.running.drain(..) {
            let outcome = match pipeline.task.await {
                Ok(result) => result,
                Err(join_error) => Err(AppError::stage("pipeline", join_error)),
            };
            match outcome {
                Ok(()) => log::info!("{} pipeline finished", pipeline.name),
                Err(e) if e.is_cancelled() => log::info!("{} pipeline cancelled", pipeline.name),
                Err(e) => {
                    log::error!("{} pipeline failed: {e}", pipeline.name);
                    self.cancel.cancel();
                    first.get_or_insert(e);
                }
            }
        }
        self.metrics.mark_finished();
        first.map_or(Ok(()), Err)
    }

    /// Signal cancellation and wait for every pipeline to drain.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.wait().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
