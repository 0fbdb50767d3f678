//! Pipelines and their supervision.
//!
//! - `ScrapePipeline`: index reading → content fetching → raw persistence
//! - `PreprocessPipeline`: author resolution → analysis → consolidated output
//! - `compress`: concatenate cleaned text into one file

pub mod compress;
mod metrics;
pub mod preprocess;
pub mod scrape;
mod supervisor;

pub use compress::compress;
pub use metrics::{Counter, Metrics, MetricsSnapshot, StageTiming};
pub use preprocess::{PreprocessPipeline, RevisionSource};
pub use scrape::ScrapePipeline;
pub use supervisor::{Pipeline, PipelineContext, PipelineSupervisor, StageGroup};
