use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::ingestion::detail::{DetailResult, DetailScraper};
use crate::pipeline::ingestion::fetcher::RetryingFetcher;
use crate::pipeline::ingestion::listing::{ListCollector, ListingQuery};
use crate::pipeline::processing::merge::Merger;
use crate::types::{RecordStatus, VenueRecord};

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub query: ListingQuery,
    /// When false every record stays `partial` without a detail lookup
    pub fetch_details: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectSummary {
    pub run_id: Uuid,
    pub pages_requested: u32,
    pub complete: usize,
    pub partial: usize,
    /// Listing items or records discarded for lack of a usable name
    pub dropped: usize,
    pub unreachable: usize,
}

#[derive(Debug, Clone)]
pub struct Collected {
    pub records: Vec<VenueRecord>,
    pub summary: CollectSummary,
}

/// Listing walk, detail scraping and merge for one run. Strictly sequential:
/// every request is awaited before the next one is issued.
pub struct CollectUseCase {
    collector: ListCollector,
    scraper: DetailScraper,
}

impl CollectUseCase {
    pub fn new(fetcher: Arc<RetryingFetcher>, config: &Config) -> Self {
        Self {
            collector: ListCollector::new(
                fetcher.clone(),
                config.listing.clone(),
                config.detail.clone(),
                config.crawl.clone(),
            ),
            scraper: DetailScraper::new(fetcher),
        }
    }

    pub async fn run(&self, options: &CollectOptions) -> Result<Collected> {
        let run_id = Uuid::new_v4();
        let span = info_span!("collect", %run_id);
        self.run_inner(run_id, options).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, options: &CollectOptions) -> Result<Collected> {
        info!("Collecting with {:?} (details: {})", options.query, options.fetch_details);
        let mut summary = CollectSummary {
            run_id,
            ..Default::default()
        };
        let mut merger = Merger::new();
        let mut records = Vec::new();
        let mut pager = self.collector.collect(&options.query);

        while let Some(entries) = pager.next_page().await? {
            for entry in entries {
                let detail = match (&entry.detail_url, options.fetch_details) {
                    (Some(url), true) => self.scraper.scrape_detail(url).await,
                    (None, true) => {
                        warn!("'{}' has no detail page url", entry.name);
                        DetailResult::Skipped
                    }
                    _ => DetailResult::Skipped,
                };
                if matches!(detail, DetailResult::Unreachable { .. }) {
                    summary.unreachable += 1;
                }

                let record = merger.merge(&entry, &detail);
                crate::metrics::record_merged(record.status);
                match record.status {
                    RecordStatus::Complete => summary.complete += 1,
                    RecordStatus::Partial => summary.partial += 1,
                    RecordStatus::Failed => {
                        summary.dropped += 1;
                        continue;
                    }
                }
                info!(
                    "{} [{}] {} schedule entries",
                    record.name,
                    record.status.as_str(),
                    record.schedule.len()
                );
                records.push(record);
            }
        }

        summary.pages_requested = pager.pages_requested();
        summary.dropped += pager.dropped();
        info!(
            "Collection finished: {} complete, {} partial, {} dropped, {} unreachable over {} pages",
            summary.complete, summary.partial, summary.dropped, summary.unreachable, summary.pages_requested
        );
        Ok(Collected { records, summary })
    }
}
