//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upstream limit on `revids` per content request.
pub const MAX_CONTENT_BATCH: usize = 20;
/// Upstream limit on `ususerids` per author request.
pub const MAX_USER_BATCH: usize = 50;
/// Upstream limit on `rvlimit` for metadata-only listings.
pub const MAX_INDEX_PAGE_LIMIT: usize = 500;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upstream query API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Index and content harvesting settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Author lookup and per-revision analysis settings
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    /// Markup-to-text converter service settings
    #[serde(default)]
    pub converter: ConverterConfig,

    /// On-disk layout
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.api.user_agent.trim().is_empty() {
            return Err(AppError::validation("api.user_agent is empty"));
        }
        url::Url::parse(&self.api.root_url)
            .map_err(|e| AppError::validation(format!("api.root_url is invalid: {e}")))?;
        if self.scraper.title.trim().is_empty() {
            return Err(AppError::validation("scraper.title is empty"));
        }
        if self.scraper.requests_per_second == 0 {
            return Err(AppError::validation(
                "scraper.requests_per_second must be > 0",
            ));
        }
        if !(1..=MAX_INDEX_PAGE_LIMIT).contains(&self.scraper.index_page_limit) {
            return Err(AppError::validation(format!(
                "scraper.index_page_limit must be within 1..={MAX_INDEX_PAGE_LIMIT}"
            )));
        }
        if !(1..=MAX_CONTENT_BATCH).contains(&self.scraper.content_batch_size) {
            return Err(AppError::validation(format!(
                "scraper.content_batch_size must be within 1..={MAX_CONTENT_BATCH}"
            )));
        }
        if !(1..=MAX_USER_BATCH).contains(&self.preprocess.user_batch_size) {
            return Err(AppError::validation(format!(
                "preprocess.user_batch_size must be within 1..={MAX_USER_BATCH}"
            )));
        }
        if self.preprocess.max_concurrent == 0 {
            return Err(AppError::validation("preprocess.max_concurrent must be > 0"));
        }
        if self.converter.endpoints.is_empty() && self.converter.instances == 0 {
            return Err(AppError::validation("converter.instances must be > 0"));
        }
        if self.converter.timeout_secs == 0 {
            return Err(AppError::validation("converter.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Directory holding every artifact of the configured document.
    pub fn document_dir(&self) -> PathBuf {
        self.paths.dump_dir.join(&self.scraper.title)
    }
}

/// Upstream query API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint of the query API
    #[serde(default = "defaults::root_url")]
    pub root_url: String,

    /// User-Agent header sent with every request
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            root_url: defaults::root_url(),
            user_agent: defaults::user_agent(),
        }
    }
}

/// Index and content harvesting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Title of the article whose history is harvested
    #[serde(default = "defaults::title")]
    pub title: String,

    /// Revisions per index page (`rvlimit`)
    #[serde(default = "defaults::index_page_limit")]
    pub index_page_limit: usize,

    /// Revision ids per content request
    #[serde(default = "defaults::content_batch_size")]
    pub content_batch_size: usize,

    /// Upper bound on upstream requests per second, shared by all stages
    #[serde(default = "defaults::requests_per_second")]
    pub requests_per_second: u32,

    /// Capacity of the index → content/persistence queues
    #[serde(default = "defaults::id_queue_capacity")]
    pub id_queue_capacity: usize,

    /// Capacity of the fetched-batch → persistence queue
    #[serde(default = "defaults::batch_queue_capacity")]
    pub batch_queue_capacity: usize,
}

impl ScraperConfig {
    /// Minimum gap between two upstream requests.
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.requests_per_second.max(1)))
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            title: defaults::title(),
            index_page_limit: defaults::index_page_limit(),
            content_batch_size: defaults::content_batch_size(),
            requests_per_second: defaults::requests_per_second(),
            id_queue_capacity: defaults::id_queue_capacity(),
            batch_queue_capacity: defaults::batch_queue_capacity(),
        }
    }
}

/// Author lookup and per-revision analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Author ids per metadata request
    #[serde(default = "defaults::user_batch_size")]
    pub user_batch_size: usize,

    /// Revisions analysed concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Capacity of the queues between preprocessing stages
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            user_batch_size: defaults::user_batch_size(),
            max_concurrent: defaults::max_concurrent(),
            queue_capacity: defaults::queue_capacity(),
        }
    }
}

/// Markup-to-text converter service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Executable started once per pool slot
    #[serde(default = "defaults::converter_command")]
    pub command: String,

    /// Port of the first spawned instance; the others follow sequentially
    #[serde(default = "defaults::base_port")]
    pub base_port: u16,

    /// Number of instances in the pool
    #[serde(default = "defaults::instances")]
    pub instances: usize,

    /// Per-conversion timeout in seconds
    #[serde(default = "defaults::converter_timeout")]
    pub timeout_secs: u64,

    /// How long to wait for a spawned instance to accept connections
    #[serde(default = "defaults::startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Already-running services; when non-empty nothing is spawned
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: defaults::converter_command(),
            base_port: defaults::base_port(),
            instances: defaults::instances(),
            timeout_secs: defaults::converter_timeout(),
            startup_timeout_secs: defaults::startup_timeout(),
            endpoints: Vec::new(),
        }
    }
}

/// On-disk layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root under which one directory per document is created
    #[serde(default = "defaults::dump_dir")]
    pub dump_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dump_dir: defaults::dump_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Api defaults
    pub fn root_url() -> String {
        "https://en.wikipedia.org/w/api.php".into()
    }
    pub fn user_agent() -> String {
        "revision-harvester/0.1 (history research; contact: maintainers@example.org)".into()
    }

    // Scraper defaults
    pub fn title() -> String {
        "Machine learning".into()
    }
    pub fn index_page_limit() -> usize {
        500
    }
    pub fn content_batch_size() -> usize {
        20
    }
    pub fn requests_per_second() -> u32 {
        3
    }
    pub fn id_queue_capacity() -> usize {
        60
    }
    pub fn batch_queue_capacity() -> usize {
        10
    }

    // Preprocess defaults
    pub fn user_batch_size() -> usize {
        49
    }
    pub fn max_concurrent() -> usize {
        40
    }
    pub fn queue_capacity() -> usize {
        100
    }

    // Converter defaults
    pub fn converter_command() -> String {
        "pandoc-server".into()
    }
    pub fn base_port() -> u16 {
        3030
    }
    pub fn instances() -> usize {
        3
    }
    pub fn converter_timeout() -> u64 {
        10
    }
    pub fn startup_timeout() -> u64 {
        30
    }

    // Path defaults
    pub fn dump_dir() -> PathBuf {
        PathBuf::from("dump").join("wikipedia")
    }
}
