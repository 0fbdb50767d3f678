//! Revision Harvester CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use revision_harvester::{
    error::Result,
    models::Config,
    pipeline::{self, PipelineSupervisor, PreprocessPipeline, RevisionSource, ScrapePipeline},
    services::{Cleaner, ConverterPool, RateLimitedFetcher, WikiApi},
    storage::DumpStorage,
    utils::http,
};

/// Harvester - wiki revision history harvesting and scoring
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Harvests and scores the edit history of a wiki article"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the revision index and fetch raw content until done or interrupted
    Scrape,

    /// Resolve authors, clean, and score every indexed revision
    Process {
        /// Path to the index file (default: {document_dir}/0ids.json)
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Concatenate all cleaned revisions into one text file
    Compress,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel the supervisor on Ctrl-C.
fn watch_interrupt(supervisor: &PipelineSupervisor) {
    let cancel = supervisor.cancellation();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => log::warn!("Interrupt received, draining in-flight work..."),
                    Err(e) => log::error!("Failed to listen for interrupt: {e}"),
                }
                cancel.cancel();
            }
        }
    });
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Revision harvester starting...");

    let config = Config::load_or_default(&cli.config);
    config.validate()?;
    log::info!(
        "Document '{}' in {}",
        config.scraper.title,
        config.document_dir().display()
    );

    let storage = DumpStorage::new(config.document_dir());

    match cli.command {
        Command::Scrape => {
            let fetcher = Arc::new(RateLimitedFetcher::new(
                http::create_async_client(&config.api)?,
                config.scraper.min_request_interval(),
            ));
            let scrape = ScrapePipeline::prepare(&config, fetcher).await?;

            let mut supervisor = PipelineSupervisor::new();
            watch_interrupt(&supervisor);
            supervisor.run(scrape);
            let outcome = supervisor.wait().await;

            supervisor.metrics().log_summary();
            outcome?;
        }

        Command::Process { index } => {
            let index = index.unwrap_or_else(|| storage.index_path());
            let source = RevisionSource::from_parts(Some(index), None)?;

            let fetcher = Arc::new(RateLimitedFetcher::new(
                http::create_async_client(&config.api)?,
                config.scraper.min_request_interval(),
            ));
            let pool = Arc::new(ConverterPool::from_config(&config.converter).await?);
            let cleaner = Cleaner::new(
                storage.clone(),
                Arc::clone(&pool),
                http::create_converter_client(&config.converter)?,
            );
            let preprocess = PreprocessPipeline::new(
                source,
                WikiApi::from_config(&config.api)?,
                fetcher,
                storage,
                cleaner,
                config.preprocess.clone(),
            );

            let mut supervisor = PipelineSupervisor::new();
            watch_interrupt(&supervisor);
            supervisor.run(preprocess);
            let outcome = supervisor.wait().await;
            pool.shutdown().await;

            supervisor.metrics().log_summary();
            outcome?;
        }

        Command::Compress => {
            let count = pipeline::compress(&storage).await?;
            log::info!("Compressed {count} revisions");
        }
    }

    log::info!("Done!");

    Ok(())
}
