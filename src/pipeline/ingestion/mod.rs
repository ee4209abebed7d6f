// Pipeline ingestion: politeness delays, retrying fetches, listing and detail extraction

pub mod detail;
pub mod fetcher;
pub mod listing;
pub mod rate_limiter;

#[cfg(test)]
pub(crate) mod testing;

pub use detail::{DetailFields, DetailResult, DetailScraper};
pub use fetcher::RetryingFetcher;
pub use listing::{ListCollector, ListingEntry, ListingQuery};
pub use rate_limiter::{DelayRange, RateLimiter};
