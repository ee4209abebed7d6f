use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::app::ports::HttpMethod;
use crate::constants::*;
use crate::error::{Result, SyncError};

/// Top-level configuration, read from `config.toml`. Every section and field
/// has a default, so a partial file (or none at all) is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub http: HttpConfig,
    pub listing: ListingConfig,
    pub detail: DetailConfig,
    pub artifact: ArtifactConfig,
    pub store: StoreConfig,
}

/// Politeness, retry and paging knobs for the collection stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub max_attempts: u32,
    pub retry_delay_secs: f64,
    /// Multiplier applied to the retry delay after each failed attempt; 1.0 keeps it fixed.
    pub backoff_factor: f64,
    /// Extra pause after a response slower than `slow_threshold_secs`. Zero disables.
    pub slow_threshold_secs: f64,
    pub slow_pause_secs: f64,
    pub lagging_threshold_secs: f64,
    pub lagging_pause_secs: f64,
    pub page_size: u32,
    pub start_page: u32,
    pub max_pages: u32,
    pub max_items: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            delay_min_secs: DEFAULT_DELAY_MIN_SECS,
            delay_max_secs: DEFAULT_DELAY_MAX_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            backoff_factor: 1.0,
            slow_threshold_secs: 5.0,
            slow_pause_secs: 30.0,
            lagging_threshold_secs: 3.0,
            lagging_pause_secs: 10.0,
            page_size: DEFAULT_PAGE_SIZE,
            start_page: 1,
            max_pages: DEFAULT_MAX_PAGES,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

impl CrawlConfig {
    /// Deterministic settings for tests: no jitter, no pauses, one retry.
    pub fn immediate() -> Self {
        Self {
            delay_min_secs: 0.0,
            delay_max_secs: 0.0,
            max_attempts: 2,
            retry_delay_secs: 0.0,
            slow_threshold_secs: 0.0,
            slow_pause_secs: 0.0,
            lagging_threshold_secs: 0.0,
            lagging_pause_secs: 0.0,
            ..Self::default()
        }
    }

    pub fn effective_max_pages(&self) -> u32 {
        self.max_pages.min(ABSOLUTE_MAX_PAGES)
    }

    pub fn effective_max_items(&self) -> usize {
        self.max_items.min(ABSOLUTE_MAX_ITEMS)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub referer: String,
    pub origin: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    pub endpoint: String,
    pub method: HttpMethod,
    pub app: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LISTING_ENDPOINT.to_string(),
            method: HttpMethod::Post,
            app: DEFAULT_APP_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    pub base_url: String,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DETAIL_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub path: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub collection: String,
    pub concurrency: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FIRESTORE_BASE_URL.to_string(),
            project_id: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            concurrency: DEFAULT_UPSERT_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `VENUE_SYNC_CONFIG` / `config.toml`.
    ///
    /// An explicitly requested file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    info!("No {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                    Config::default()
                }
            }
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(project) = std::env::var(ENV_FIRESTORE_PROJECT) {
            if !project.trim().is_empty() {
                self.store.project_id = project.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let crawl = &self.crawl;
        let seconds = [
            ("delay_min_secs", crawl.delay_min_secs),
            ("delay_max_secs", crawl.delay_max_secs),
            ("retry_delay_secs", crawl.retry_delay_secs),
            ("slow_threshold_secs", crawl.slow_threshold_secs),
            ("slow_pause_secs", crawl.slow_pause_secs),
            ("lagging_threshold_secs", crawl.lagging_threshold_secs),
            ("lagging_pause_secs", crawl.lagging_pause_secs),
        ];
        for (name, value) in seconds {
            if !value.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&value) {
                return Err(SyncError::Config(format!(
                    "crawl.{} must be between 0 and {}, got {}",
                    name, MAX_WAIT_SECS, value
                )));
            }
        }
        if !crawl.backoff_factor.is_finite() {
            return Err(SyncError::Config(format!(
                "crawl.backoff_factor must be finite, got {}",
                crawl.backoff_factor
            )));
        }
        if crawl.delay_min_secs < 0.0 || crawl.delay_max_secs < crawl.delay_min_secs {
            return Err(SyncError::Config(format!(
                "crawl delay bounds are invalid: [{}, {}]",
                crawl.delay_min_secs, crawl.delay_max_secs
            )));
        }
        if crawl.max_attempts == 0 {
            return Err(SyncError::Config("crawl.max_attempts must be at least 1".into()));
        }
        if crawl.retry_delay_secs < 0.0 || crawl.backoff_factor < 1.0 {
            return Err(SyncError::Config(
                "crawl.retry_delay_secs must be >= 0 and crawl.backoff_factor >= 1".into(),
            ));
        }
        if crawl.page_size == 0 || crawl.start_page == 0 {
            return Err(SyncError::Config("crawl.page_size and crawl.start_page must be positive".into()));
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.http.timeout_secs) {
            return Err(SyncError::Config(format!(
                "http.timeout_secs must be between {} and {}",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS
            )));
        }
        if self.store.collection.trim().is_empty() {
            return Err(SyncError::Config("store.collection must not be empty".into()));
        }
        Ok(())
    }
}
