use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::VenueRecord;

// Fetch-side ports

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    /// Parameters are sent as an urlencoded form body
    Post,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn new(method: HttpMethod, url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            method,
            url: url.into(),
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The request rendered as a single URL (parameters in the query string),
    /// used for traceability regardless of the method.
    pub fn display_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        match reqwest::Url::parse_with_params(&self.url, &self.params) {
            Ok(url) => url.to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpResponse {
    pub fn new(status: u16, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            status,
            bytes,
            content_type: content_type.into(),
        }
    }

    /// Body decoded with the charset from the `Content-Type` header, then a
    /// `charset=` declaration near the top of the document, then UTF-8.
    pub fn text(&self) -> String {
        let encoding = charset_label(&self.content_type)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .or_else(|| sniff_meta_charset(&self.bytes))
            .unwrap_or(UTF_8);
        let (text, _, _) = encoding.decode(&self.bytes);
        text.into_owned()
    }
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

// A meta charset must appear within the first 1024 bytes
const META_SNIFF_LEN: usize = 1024;

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(META_SNIFF_LEN)]).to_ascii_lowercase();
    let rest = &head[head.find("charset=")? + "charset=".len()..];
    let label: String = rest
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    Encoding::for_label(label.as_bytes())
}

/// Failure below the HTTP status level.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Other(String),
}

#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Issue one request. Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

// Load-side ports

#[async_trait]
pub trait DocumentStorePort: Send + Sync {
    /// Insert or replace the document keyed by `record.id`.
    async fn upsert(&self, record: &VenueRecord) -> Result<(), String>;
}
