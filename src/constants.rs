/// Upstream endpoints and fixed limits shared across the crate.
/// Anything a deployment may want to change lives in `config.rs`; these are the defaults.

// Listing API (structured, paged)
pub const DEFAULT_LISTING_ENDPOINT: &str =
    "https://catholicapi.catholic.or.kr/app/parish/getParishList.asp";
// Detail page (unstructured HTML, one per venue)
pub const DEFAULT_DETAIL_BASE_URL: &str =
    "https://maria.catholic.or.kr/mobile/church/bondang_view.asp";
pub const DEFAULT_APP_ID: &str = "goodnews";

// Request headers the listing API expects
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://maria.catholic.or.kr/";
pub const DEFAULT_ORIGIN: &str = "https://maria.catholic.or.kr";

// Crawl bounds. The absolute caps bound crawl duration regardless of CLI input.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_PAGES: u32 = 5;
pub const DEFAULT_MAX_ITEMS: usize = 100;
pub const ABSOLUTE_MAX_PAGES: u32 = 200;
pub const ABSOLUTE_MAX_ITEMS: usize = 3000;

pub const DEFAULT_DELAY_MIN_SECS: f64 = 1.0;
pub const DEFAULT_DELAY_MAX_SECS: f64 = 3.0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 5.0;
// Ceiling for any single delay, retry wait or pause
pub const MAX_WAIT_SECS: f64 = 3600.0;
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const MIN_TIMEOUT_SECS: u64 = 10;
pub const MAX_TIMEOUT_SECS: u64 = 30;

// Document store
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_COLLECTION: &str = "catholic_churches";
pub const DEFAULT_UPSERT_CONCURRENCY: usize = 4;

// Files
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_ARTIFACT_PATH: &str = "data/venues.json";
pub const FOLLOWUP_SUFFIX: &str = "missing";

// Environment variables
pub const ENV_CONFIG_PATH: &str = "VENUE_SYNC_CONFIG";
pub const ENV_FIRESTORE_PROJECT: &str = "FIRESTORE_PROJECT_ID";
pub const ENV_FIRESTORE_TOKEN: &str = "FIRESTORE_TOKEN";
pub const ENV_METRICS_PORT: &str = "VENUE_SYNC_METRICS_PORT";
