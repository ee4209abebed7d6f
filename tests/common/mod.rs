#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use venue_sync::app::ports::{HttpClientPort, HttpRequest, HttpResponse, TransportError};
use venue_sync::types::{RecordStatus, ScheduleEntry, SourceKind, VenueRecord, VenueType};

type Responder = Box<dyn FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send>;

/// `HttpClientPort` answering from a closure and recording every request.
pub struct FakeHttp {
    responder: Mutex<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new(
        responder: impl FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + 'static,
    ) -> Self {
        Self {
            responder: Mutex::new(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpClientPort for FakeHttp {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responder = self.responder.lock().unwrap();
        (&mut *responder)(request)
    }
}

pub fn json_response(value: serde_json::Value) -> HttpResponse {
    HttpResponse::new(200, value.to_string().into_bytes(), "application/json")
}

pub fn html_response(body: &str) -> HttpResponse {
    HttpResponse::new(200, body.as_bytes().to_vec(), "text/html")
}

pub fn status_response(code: u16) -> HttpResponse {
    HttpResponse::new(code, Vec::new(), "text/plain")
}

pub fn record(id: &str, name: &str) -> VenueRecord {
    let mut source_urls = BTreeMap::new();
    source_urls.insert(SourceKind::Listing, format!("https://list.test/?keyword={}", id));
    VenueRecord {
        id: id.to_string(),
        name: name.to_string(),
        address: format!("{} 주소", name),
        phone: Some("02-000-0000".to_string()),
        lat: Some(37.5),
        lng: Some(127.0),
        venue_type: VenueType::Parish,
        schedule: vec![ScheduleEntry::new("주일미사", "일", "10:00")],
        schedule_text: "[주일미사] 일: 10:00".to_string(),
        source_urls,
        status: RecordStatus::Complete,
        fetched_at: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
        source_key: None,
        priest: None,
        image_url: None,
        reference_url: None,
        alt_phones: vec![],
    }
}
