//! Pipeline metrics.
//!
//! Counters are recorded through the `metrics` facade; they are no-ops unless a
//! recorder is installed by [`init_metrics`].

use std::net::SocketAddr;
use tracing::{info, warn};

use crate::constants::ENV_METRICS_PORT;
use crate::types::RecordStatus;

pub const HTTP_REQUESTS_TOTAL: &str = "venue_sync_http_requests_total";
pub const HTTP_RETRIES_TOTAL: &str = "venue_sync_http_retries_total";
pub const HTTP_REQUEST_DURATION: &str = "venue_sync_http_request_duration_seconds";
pub const LISTING_PAGES_TOTAL: &str = "venue_sync_listing_pages_total";
pub const RECORDS_TOTAL: &str = "venue_sync_records_total";
pub const UPSERTS_TOTAL: &str = "venue_sync_upserts_total";

/// Install the Prometheus exporter when `VENUE_SYNC_METRICS_PORT` is set.
pub fn init_metrics() {
    let port: u16 = match std::env::var(ENV_METRICS_PORT).ok().and_then(|s| s.parse().ok()) {
        Some(port) => port,
        None => return,
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}

/// `outcome` is one of `success`, `transient`, `rejected`.
pub fn http_request(outcome: &'static str, duration_secs: f64) {
    metrics::counter!(HTTP_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION).record(duration_secs);
}

pub fn http_retry() {
    metrics::counter!(HTTP_RETRIES_TOTAL).increment(1);
}

pub fn listing_page() {
    metrics::counter!(LISTING_PAGES_TOTAL).increment(1);
}

pub fn record_merged(status: RecordStatus) {
    metrics::counter!(RECORDS_TOTAL, "status" => status.as_str()).increment(1);
}

pub fn upsert(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(UPSERTS_TOTAL, "outcome" => outcome).increment(1);
}
