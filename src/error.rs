use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single outbound request, as seen by `RetryingFetcher`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Timeouts, connection resets and 5xx responses. Retried.
    #[error("transient network error: {0}")]
    Transient(String),

    /// 4xx responses, malformed requests or malformed response bodies. Never retried.
    #[error("non-retryable request error (status {status:?}): {message}")]
    NonRetryable { status: Option<u16>, message: String },

    /// The retry budget ran out; carries the last transient error.
    #[error("fetch exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("listing API unreachable at {url}: {source}")]
    ListingUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("artifact {path} could not be accessed: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {path} is not a valid venue snapshot: {source}")]
    ArtifactFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("no record named '{0}' in the artifact")]
    RecordNotFound(String),

    #[error("upsert of '{id}' failed: {message}")]
    RemoteWrite { id: String, message: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;
