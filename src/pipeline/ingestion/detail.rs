use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::ports::HttpRequest;
use crate::pipeline::ingestion::fetcher::RetryingFetcher;
use crate::types::ScheduleEntry;

static SCHEDULE_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.register05").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static TH: Lazy<Selector> = Lazy::new(|| Selector::parse("th").expect("valid selector"));
static TD: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static TEL_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href^="tel:"]"#).expect("valid selector"));
static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?0\d{1,2}\)?[-.\s]?\d{3,4}[-.\s]\d{4}").expect("valid regex"));

const PHONE_LABELS: &[&str] = &["전화", "tel", "phone"];
const ADDRESS_LABELS: &[&str] = &["주소", "address"];
const REFERENCE_LABELS: &[&str] = &["홈페이지", "블로그", "blog", "homepage"];

/// Fields recovered from one detail page. Any of them may be empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailFields {
    pub url: String,
    pub schedule: Vec<ScheduleEntry>,
    /// Every distinct phone number on the page, in page order
    pub phones: Vec<String>,
    pub address: Option<String>,
    pub reference_url: Option<String>,
    /// Sections the page did not have ("schedule", "phone", "address")
    pub missing_sections: Vec<String>,
}

impl DetailFields {
    pub fn is_incomplete(&self) -> bool {
        !self.missing_sections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailResult {
    /// Page fetched; the schedule may still be empty
    Ok(DetailFields),
    /// Fetch failed after retries or was rejected
    Unreachable { url: String, reason: String },
    /// No detail page was requested for this entry
    Skipped,
}

impl DetailResult {
    pub fn url(&self) -> Option<&str> {
        match self {
            DetailResult::Ok(fields) => Some(&fields.url),
            DetailResult::Unreachable { url, .. } => Some(url),
            DetailResult::Skipped => None,
        }
    }
}

pub struct DetailScraper {
    fetcher: Arc<RetryingFetcher>,
}

impl DetailScraper {
    pub fn new(fetcher: Arc<RetryingFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch and parse one detail page. Never fails: fetch problems become
    /// `Unreachable` and missing markup becomes missing sections.
    pub async fn scrape_detail(&self, url: &str) -> DetailResult {
        match self.fetcher.fetch(&HttpRequest::get(url)).await {
            Ok(response) => {
                let fields = parse_detail_page(url, &response.text());
                if fields.is_incomplete() {
                    debug!(url, missing = ?fields.missing_sections, "Detail page is incomplete");
                }
                DetailResult::Ok(fields)
            }
            Err(e) => {
                warn!(url, error = %e, "Detail page unreachable");
                DetailResult::Unreachable {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

pub fn parse_detail_page(url: &str, html: &str) -> DetailFields {
    let document = Html::parse_document(html);
    let mut fields = DetailFields {
        url: url.to_string(),
        ..Default::default()
    };

    match document.select(&SCHEDULE_TABLE).next() {
        Some(table) => fields.schedule = parse_schedule(table),
        None => fields.missing_sections.push("schedule".to_string()),
    }

    for row in document.select(&ROW) {
        let Some(header) = row.select(&TH).next() else {
            continue;
        };
        let label = element_text(header).to_lowercase();
        let values: Vec<ElementRef> = row.select(&TD).collect();
        if values.is_empty() {
            continue;
        }

        if has_label(&label, PHONE_LABELS) {
            for td in &values {
                push_phones(&mut fields.phones, &element_text(*td));
            }
        } else if has_label(&label, ADDRESS_LABELS) && fields.address.is_none() {
            let address = element_text(values[0]);
            if !address.is_empty() {
                fields.address = Some(address);
            }
        } else if has_label(&label, REFERENCE_LABELS) && fields.reference_url.is_none() {
            fields.reference_url = values
                .iter()
                .flat_map(|td| td.select(&LINK))
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| absolute_link(url, href))
                .or_else(|| {
                    let text = element_text(values[0]);
                    text.starts_with("http").then_some(text)
                });
        }
    }

    for link in document.select(&TEL_LINK) {
        if let Some(number) = link.value().attr("href").and_then(|h| h.strip_prefix("tel:")) {
            push_phones(&mut fields.phones, number);
        }
    }
    if fields.phones.is_empty() {
        let body_text = document.root_element().text().collect::<Vec<_>>().join(" ");
        push_phones(&mut fields.phones, &body_text);
    }

    if fields.reference_url.is_none() {
        fields.reference_url = document.select(&LINK).find_map(|a| {
            let href = a.value().attr("href")?;
            let text = element_text(a).to_lowercase();
            let labelled = has_label(&text, REFERENCE_LABELS) || href.contains("blog");
            if labelled {
                absolute_link(url, href)
            } else {
                None
            }
        });
    }

    if fields.phones.is_empty() {
        fields.missing_sections.push("phone".to_string());
    }
    if fields.address.is_none() {
        fields.missing_sections.push("address".to_string());
    }
    fields
}

/// Rows of the schedule table. A `th` sets the label for its row and, through
/// rowspan, for the rows after it.
fn parse_schedule(table: ElementRef) -> Vec<ScheduleEntry> {
    let mut entries = Vec::new();
    let mut label = String::new();

    for row in table.select(&ROW) {
        let header = row.select(&TH).next();
        if let Some(th) = header {
            label = element_text(th);
        }
        let cells: Vec<String> = row.select(&TD).map(element_text).collect();

        match cells.as_slice() {
            [day, times, ..] => {
                if !day.is_empty() && !times.is_empty() {
                    entries.push(ScheduleEntry::new(label.clone(), day.clone(), times.clone()));
                }
            }
            [times] if header.is_some() => {
                if !times.is_empty() {
                    entries.push(ScheduleEntry::new(label.clone(), "", times.clone()));
                }
            }
            _ => {}
        }
    }
    entries
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_label(text: &str, labels: &[&str]) -> bool {
    labels.iter().any(|l| text.contains(l))
}

fn push_phones(phones: &mut Vec<String>, text: &str) {
    for m in PHONE.find_iter(text) {
        let number = m.as_str().trim().to_string();
        if !phones.contains(&number) {
            phones.push(number);
        }
    }
}

fn absolute_link(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("tel:") {
        return None;
    }
    match reqwest::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => href.starts_with("http").then(|| href.to_string()),
    }
}
