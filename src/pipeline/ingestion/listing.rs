use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::ports::HttpRequest;
use crate::config::{CrawlConfig, DetailConfig, ListingConfig};
use crate::error::{FetchError, Result, SyncError};
use crate::pipeline::ingestion::fetcher::RetryingFetcher;
use crate::pipeline::processing::merge::normalize_name;
use crate::types::VenueType;

/// What to ask the listing API for.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingQuery {
    /// Free-text filter, paged until the API runs dry or the page cap is hit
    Keyword(String),
    /// Bulk enumeration of at most this many pages
    Pages(u32),
}

impl ListingQuery {
    fn keyword(&self) -> &str {
        match self {
            ListingQuery::Keyword(k) => k.trim(),
            ListingQuery::Pages(_) => "",
        }
    }
}

/// One candidate venue as the listing API describes it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingEntry {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Category stated by the source, if any
    pub venue_type: Option<VenueType>,
    pub detail_url: Option<String>,
    /// Listing page this entry was read from
    pub listing_url: String,
    pub source_key: Option<String>,
    pub priest: Option<String>,
    pub image_url: Option<String>,
}

impl ListingEntry {
    /// Pull the known fields out of one untyped listing item.
    ///
    /// Missing or oddly typed fields default instead of failing; `None` means the
    /// item has no usable name and cannot become a record.
    pub fn from_value(item: &Value, listing_url: &str, detail: &DetailConfig, app: &str) -> Option<Self> {
        if !item.is_object() {
            return None;
        }
        let name = normalize_name(&text_field(item, &["TITLE", "name", "title"])?);
        if name.is_empty() {
            return None;
        }

        let source_key = text_field(item, &["orgnum", "id", "orgNum"]);
        let detail_url = text_field(item, &["url", "detailUrl"])
            .or_else(|| source_key.as_deref().map(|key| detail_url_for(detail, app, key)));

        Some(Self {
            name,
            address: text_field(item, &["addr", "address"])
                .map(|a| normalize_name(&a))
                .unwrap_or_default(),
            phone: text_field(item, &["phone", "tel"]),
            lat: coordinate(item, &["lat", "latitude", "mapY"]),
            lng: coordinate(item, &["lng", "longitude", "mapX"]),
            venue_type: text_field(item, &["type"]).and_then(|t| VenueType::parse(&t)),
            detail_url,
            listing_url: listing_url.to_string(),
            source_key,
            priest: text_field(item, &["father", "priest"]),
            image_url: text_field(item, &["imgURL", "imageUrl"]),
        })
    }
}

fn detail_url_for(detail: &DetailConfig, app: &str, key: &str) -> String {
    match reqwest::Url::parse_with_params(&detail.base_url, &[("app", app), ("orgnum", key)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}?app={}&orgnum={}", detail.base_url, app, key),
    }
}

/// First non-empty string (or number rendered as a string) among `keys`.
fn text_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn coordinate(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let value = match item.get(*key)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        // 0 is what the source sends for "not geocoded"
        (value.is_finite() && value != 0.0).then_some(value)
    })
}

/// The array of listing items inside a response body.
pub fn extract_items(body: &Value) -> &[Value] {
    if let Some(items) = body.as_array() {
        return items;
    }
    ["BOARDLIST", "items", "data"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn result_count(body: &Value) -> Option<usize> {
    match body.get("ResultCount")? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Enumerates candidate venues from the structured listing API.
pub struct ListCollector {
    fetcher: Arc<RetryingFetcher>,
    listing: ListingConfig,
    detail: DetailConfig,
    crawl: CrawlConfig,
}

impl ListCollector {
    pub fn new(
        fetcher: Arc<RetryingFetcher>,
        listing: ListingConfig,
        detail: DetailConfig,
        crawl: CrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            listing,
            detail,
            crawl,
        }
    }

    /// Start a lazy walk over the listing pages for `query`.
    pub fn collect(&self, query: &ListingQuery) -> ListingPager<'_> {
        let page_cap = match query {
            ListingQuery::Pages(n) => (*n).min(self.crawl.effective_max_pages()),
            ListingQuery::Keyword(_) => self.crawl.effective_max_pages(),
        };
        ListingPager {
            collector: self,
            keyword: query.keyword().to_string(),
            next_page: self.crawl.start_page.max(1),
            pages_left: page_cap,
            items_left: self.crawl.effective_max_items(),
            pages_requested: 0,
            dropped: 0,
            done: false,
        }
    }

    fn page_request(&self, keyword: &str, page: u32) -> HttpRequest {
        let params = vec![
            ("gyoCode".to_string(), String::new()),
            ("localCode".to_string(), String::new()),
            ("giguCode".to_string(), String::new()),
            ("keyword".to_string(), keyword.to_string()),
            ("app".to_string(), self.listing.app.clone()),
            ("PAGE".to_string(), page.to_string()),
            ("P_SIZE".to_string(), self.crawl.page_size.to_string()),
        ];
        HttpRequest::new(self.listing.method, self.listing.endpoint.clone(), params)
    }
}

/// Page-at-a-time cursor over a listing query. Ends on an empty page or when
/// the page or item cap is reached. The source's `ResultCount` is only logged;
/// it is unreliable and sometimes counts a single page.
pub struct ListingPager<'a> {
    collector: &'a ListCollector,
    keyword: String,
    next_page: u32,
    pages_left: u32,
    items_left: usize,
    pages_requested: u32,
    dropped: usize,
    done: bool,
}

impl<'a> ListingPager<'a> {
    pub fn pages_requested(&self) -> u32 {
        self.pages_requested
    }

    /// Items that had no usable name.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Fetch the next page. `Ok(None)` ends the sequence.
    ///
    /// Failing to get the very first page is an error; a later page failing only
    /// ends the walk early, keeping what was already collected.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ListingEntry>>> {
        if self.done || self.pages_left == 0 || self.items_left == 0 {
            self.done = true;
            return Ok(None);
        }

        let page = self.next_page;
        let request = self.collector.page_request(&self.keyword, page);
        let listing_url = request.display_url();
        let first = self.pages_requested == 0;
        self.pages_requested += 1;
        self.pages_left -= 1;
        self.next_page += 1;

        let body = match self.fetch_body(&request).await {
            Ok(body) => body,
            Err(source) if first => {
                return Err(SyncError::ListingUnavailable {
                    url: listing_url,
                    source,
                })
            }
            Err(e) => {
                warn!("Listing page {} failed, stopping pagination: {}", page, e);
                self.done = true;
                return Ok(None);
            }
        };

        if first {
            if let Some(total) = result_count(&body) {
                info!("Listing reports {} results", total);
            }
        }
        let items = extract_items(&body);
        if items.is_empty() {
            debug!("Listing page {} is empty, pagination finished", page);
            self.done = true;
            return Ok(None);
        }
        crate::metrics::listing_page();

        let detail = &self.collector.detail;
        let app = &self.collector.listing.app;
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            if entries.len() >= self.items_left {
                break;
            }
            match ListingEntry::from_value(item, &listing_url, detail, app) {
                Some(entry) => entries.push(entry),
                None => {
                    self.dropped += 1;
                    debug!("Dropping listing item without a name on page {}", page);
                }
            }
        }
        self.items_left -= entries.len();
        info!("Listing page {}: {} entries", page, entries.len());
        Ok(Some(entries))
    }

    async fn fetch_body(&self, request: &HttpRequest) -> std::result::Result<Value, FetchError> {
        let response = self.collector.fetcher.fetch(request).await?;
        serde_json::from_slice(&response.bytes).map_err(|e| FetchError::NonRetryable {
            status: Some(response.status),
            message: format!("listing response is not JSON: {}", e),
        })
    }

    /// Drain the pager into one vector.
    pub async fn collect_all(&mut self) -> Result<Vec<ListingEntry>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::TransportError;
    use crate::pipeline::ingestion::testing::{json, status, ScriptedHttp};
    use serde_json::json;

    fn page_of(page: u32, count: usize) -> Value {
        let items: Vec<Value> = (0..count)
            .map(|i| json!({ "TITLE": format!("성당 {}-{}", page, i), "orgnum": page * 100 + i as u32 }))
            .collect();
        json!({ "BOARDLIST": items })
    }

    fn collector(http: Arc<ScriptedHttp>, crawl: CrawlConfig) -> ListCollector {
        let fetcher = Arc::new(RetryingFetcher::new(http, &crawl));
        ListCollector::new(fetcher, ListingConfig::default(), DetailConfig::default(), crawl)
    }

    fn page_param(request: &HttpRequest) -> u32 {
        request.param("PAGE").and_then(|p| p.parse().ok()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_pagination_stops_at_empty_page() {
        let http = Arc::new(ScriptedHttp::new(|req| {
            let page = page_param(req);
            Ok(json(200, page_of(page, if page <= 2 { 5 } else { 0 })))
        }));
        let collector = collector(http.clone(), CrawlConfig::immediate());

        let mut pager = collector.collect(&ListingQuery::Pages(10));
        let entries = pager.collect_all().await.unwrap();

        assert_eq!(entries.len(), 10);
        assert_eq!(http.count(), 3);
        assert_eq!(pager.pages_requested(), 3);
    }

    #[tokio::test]
    async fn test_page_cap_bounds_requests() {
        let http = Arc::new(ScriptedHttp::new(|req| Ok(json(200, page_of(page_param(req), 5)))));
        let collector = collector(http.clone(), CrawlConfig::immediate());

        let entries = collector.collect(&ListingQuery::Pages(2)).collect_all().await.unwrap();

        assert_eq!(entries.len(), 10);
        assert_eq!(http.count(), 2);
    }

    #[tokio::test]
    async fn test_item_cap_cuts_mid_page() {
        let http = Arc::new(ScriptedHttp::new(|req| Ok(json(200, page_of(page_param(req), 5)))));
        let crawl = CrawlConfig {
            max_items: 7,
            ..CrawlConfig::immediate()
        };
        let collector = collector(http.clone(), crawl);

        let entries = collector.collect(&ListingQuery::Pages(5)).collect_all().await.unwrap();

        assert_eq!(entries.len(), 7);
        assert_eq!(http.count(), 2);
    }

    #[tokio::test]
    async fn test_result_count_does_not_end_walk() {
        // the total is reported on every page but the walk still ends on the empty third page
        for reported in [json!(10), json!("5")] {
            let http = Arc::new(ScriptedHttp::new(move |req| {
                let count = if page_param(req) <= 2 { 5 } else { 0 };
                let mut body = page_of(page_param(req), count);
                body["ResultCount"] = reported.clone();
                Ok(json(200, body))
            }));
            let collector = collector(http.clone(), CrawlConfig::immediate());

            let entries = collector.collect(&ListingQuery::Pages(10)).collect_all().await.unwrap();

            assert_eq!(entries.len(), 10);
            assert_eq!(http.count(), 3);
        }
    }

    #[tokio::test]
    async fn test_first_page_failure_is_listing_unavailable() {
        let http = Arc::new(ScriptedHttp::new(|_| Err(TransportError::Timeout)));
        let collector = collector(http.clone(), CrawlConfig::immediate());

        let err = collector.collect(&ListingQuery::Pages(3)).collect_all().await.unwrap_err();

        assert!(matches!(err, SyncError::ListingUnavailable { .. }));
        // one logical request, retried up to max_attempts
        assert_eq!(http.count(), 2);
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_earlier_pages() {
        let http = Arc::new(ScriptedHttp::new(|req| {
            if page_param(req) == 1 {
                Ok(json(200, page_of(1, 3)))
            } else {
                Ok(status(500))
            }
        }));
        let collector = collector(http, CrawlConfig::immediate());

        let entries = collector.collect(&ListingQuery::Pages(3)).collect_all().await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_malformed_first_page_is_an_error() {
        let http = Arc::new(ScriptedHttp::new(|_| Ok(crate::pipeline::ingestion::testing::html("<html>"))));
        let collector = collector(http.clone(), CrawlConfig::immediate());

        let err = collector.collect(&ListingQuery::Pages(1)).collect_all().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::ListingUnavailable {
                source: FetchError::NonRetryable { .. },
                ..
            }
        ));
        assert_eq!(http.count(), 1);
    }

    #[tokio::test]
    async fn test_keyword_is_sent_as_parameter() {
        let http = Arc::new(ScriptedHttp::new(|_| Ok(json(200, json!({ "BOARDLIST": [] })))));
        let collector = collector(http.clone(), CrawlConfig::immediate());

        let entries = collector
            .collect(&ListingQuery::Keyword(" 명동 ".into()))
            .collect_all()
            .await
            .unwrap();

        assert!(entries.is_empty());
        let requests = http.requests();
        assert_eq!(requests[0].param("keyword"), Some("명동"));
        assert_eq!(requests[0].param("PAGE"), Some("1"));
        assert_eq!(requests[0].param("app"), Some("goodnews"));
    }

    #[test]
    fn test_entry_extraction_is_defensive() {
        let detail = DetailConfig {
            base_url: "https://detail.test/view.asp".into(),
        };
        let item = json!({
            "TITLE": "  명동   대성당 ",
            "addr": "서울 중구 명동길 74",
            "tel": "02-774-1784",
            "orgnum": 1234,
            "father": "홍길동",
            "mapY": "37.5633",
            "mapX": 126.9873,
            "type": "Cathedral"
        });

        let entry = ListingEntry::from_value(&item, "https://list.test/?PAGE=1", &detail, "goodnews").unwrap();

        assert_eq!(entry.name, "명동 대성당");
        assert_eq!(entry.phone.as_deref(), Some("02-774-1784"));
        assert_eq!(entry.source_key.as_deref(), Some("1234"));
        assert_eq!(entry.lat, Some(37.5633));
        assert_eq!(entry.lng, Some(126.9873));
        assert_eq!(entry.venue_type, Some(VenueType::Cathedral));
        assert_eq!(entry.priest.as_deref(), Some("홍길동"));
        assert_eq!(
            entry.detail_url.as_deref(),
            Some("https://detail.test/view.asp?app=goodnews&orgnum=1234")
        );

        let sparse = ListingEntry::from_value(&json!({ "name": "공소", "lat": 0 }), "u", &detail, "g").unwrap();
        assert_eq!(sparse.address, "");
        assert_eq!(sparse.lat, None);
        assert_eq!(sparse.detail_url, None);

        assert!(ListingEntry::from_value(&json!({ "addr": "no name" }), "u", &detail, "g").is_none());
        assert!(ListingEntry::from_value(&json!("string item"), "u", &detail, "g").is_none());
    }

    #[test]
    fn test_extract_items_fallbacks() {
        assert_eq!(extract_items(&json!([{ "a": 1 }])).len(), 1);
        assert_eq!(extract_items(&json!({ "items": [1, 2] })).len(), 2);
        assert!(extract_items(&json!({ "unexpected": true })).is_empty());
    }
}
