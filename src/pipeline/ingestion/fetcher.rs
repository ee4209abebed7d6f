use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app::ports::{HttpClientPort, HttpRequest, HttpResponse, TransportError};
use crate::config::CrawlConfig;
use crate::error::FetchError;
use crate::pipeline::ingestion::rate_limiter::{bounded_wait, DelayRange, RateLimiter};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt number `attempt` (1-based). Saturates
    /// at `MAX_WAIT_SECS`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        bounded_wait(self.retry_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exponent))
    }
}

impl From<&CrawlConfig> for RetryPolicy {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: bounded_wait(config.retry_delay_secs),
            backoff_factor: config.backoff_factor,
        }
    }
}

/// Extra pause after a slow response, to let an overloaded server recover.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThrottlePolicy {
    pub slow_threshold: Duration,
    pub slow_pause: Duration,
    pub lagging_threshold: Duration,
    pub lagging_pause: Duration,
}

impl ThrottlePolicy {
    pub fn pause_for(&self, elapsed: Duration) -> Option<Duration> {
        if !self.slow_threshold.is_zero() && elapsed >= self.slow_threshold && !self.slow_pause.is_zero() {
            return Some(self.slow_pause);
        }
        if !self.lagging_threshold.is_zero()
            && elapsed >= self.lagging_threshold
            && !self.lagging_pause.is_zero()
        {
            return Some(self.lagging_pause);
        }
        None
    }
}

impl From<&CrawlConfig> for ThrottlePolicy {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            slow_threshold: bounded_wait(config.slow_threshold_secs),
            slow_pause: bounded_wait(config.slow_pause_secs),
            lagging_threshold: bounded_wait(config.lagging_threshold_secs),
            lagging_pause: bounded_wait(config.lagging_pause_secs),
        }
    }
}

/// Issues one logical request with rate limiting and bounded retries.
///
/// Every attempt, including retries, goes through `RateLimiter::wait` first.
pub struct RetryingFetcher {
    http: Arc<dyn HttpClientPort>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    throttle: ThrottlePolicy,
}

impl RetryingFetcher {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &CrawlConfig) -> Self {
        Self::with_parts(
            http,
            RateLimiter::new(DelayRange::from(config)),
            RetryPolicy::from(config),
            ThrottlePolicy::from(config),
        )
    }

    pub fn with_parts(
        http: Arc<dyn HttpClientPort>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        throttle: ThrottlePolicy,
    ) -> Self {
        Self {
            http,
            limiter,
            retry,
            throttle,
        }
    }

    pub async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.limiter.wait().await;

            let started = Instant::now();
            let outcome = classify(self.http.send(request).await);
            let elapsed = started.elapsed();

            match outcome {
                Ok(response) => {
                    crate::metrics::http_request("success", elapsed.as_secs_f64());
                    debug!(url = %request.url, status = response.status, attempt, "fetched");
                    if let Some(pause) = self.throttle.pause_for(elapsed) {
                        info!(
                            url = %request.url,
                            "Server responded slowly ({:.1}s), pausing {:?}",
                            elapsed.as_secs_f64(),
                            pause
                        );
                        tokio::time::sleep(pause).await;
                    }
                    return Ok(response);
                }
                Err(err @ FetchError::NonRetryable { .. }) => {
                    crate::metrics::http_request("rejected", elapsed.as_secs_f64());
                    warn!(url = %request.url, error = %err, "Request rejected, not retrying");
                    return Err(err);
                }
                Err(err) => {
                    crate::metrics::http_request("transient", elapsed.as_secs_f64());
                    warn!(
                        url = %request.url,
                        error = %err,
                        "Request failed (attempt {}/{})",
                        attempt,
                        max_attempts
                    );
                    last_error = Some(err);
                    if attempt < max_attempts {
                        let delay = self.retry.delay_after(attempt);
                        crate::metrics::http_retry();
                        debug!("Retrying in {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(url = %request.url, "All retries exhausted");
        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last: Box::new(
                last_error.unwrap_or_else(|| FetchError::Transient("no attempt was made".into())),
            ),
        })
    }
}

/// Sort a raw transport outcome into success, transient, or non-retryable.
fn classify(result: Result<HttpResponse, TransportError>) -> Result<HttpResponse, FetchError> {
    match result {
        Ok(response) => match response.status {
            200..=299 => Ok(response),
            // request timeout and throttling are the server asking us to come back later
            408 | 429 => Err(FetchError::Transient(format!("HTTP {}", response.status))),
            500..=599 => Err(FetchError::Transient(format!("HTTP {}", response.status))),
            status => Err(FetchError::NonRetryable {
                status: Some(status),
                message: format!("HTTP {}", status),
            }),
        },
        Err(TransportError::InvalidRequest(message)) => {
            Err(FetchError::NonRetryable { status: None, message })
        }
        Err(err) => Err(FetchError::Transient(err.to_string())),
    }
}
