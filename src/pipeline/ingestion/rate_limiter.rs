use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::CrawlConfig;
use crate::constants::MAX_WAIT_SECS;

/// Seconds to a `Duration`, clamped to `[0, MAX_WAIT_SECS]`. NaN counts as zero.
pub fn bounded_wait(secs: f64) -> Duration {
    Duration::from_secs_f64(clamp_secs(secs))
}

fn clamp_secs(secs: f64) -> f64 {
    if secs.is_nan() {
        0.0
    } else {
        secs.clamp(0.0, MAX_WAIT_SECS)
    }
}

/// Inclusive bounds, in seconds, for the randomized delay before each request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let min_secs = clamp_secs(min_secs);
        Self {
            min_secs,
            max_secs: clamp_secs(max_secs).max(min_secs),
        }
    }

    pub fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    pub fn contains(&self, delay: Duration) -> bool {
        let secs = delay.as_secs_f64();
        // allow for float rounding in Duration::from_secs_f64
        secs >= self.min_secs - 1e-6 && secs <= self.max_secs + 1e-6
    }
}

impl From<&CrawlConfig> for DelayRange {
    fn from(config: &CrawlConfig) -> Self {
        Self::new(config.delay_min_secs, config.delay_max_secs)
    }
}

/// Ethical-crawling delay: every outbound request waits a uniformly random
/// duration from `range` first. One limiter is shared by every component that
/// talks to the upstream servers.
#[derive(Debug)]
pub struct RateLimiter {
    range: DelayRange,
    rng: Mutex<StdRng>,
}

impl RateLimiter {
    pub fn new(range: DelayRange) -> Self {
        Self {
            range,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(range: DelayRange, seed: u64) -> Self {
        Self {
            range,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw the next delay without sleeping.
    pub fn next_delay(&self) -> Duration {
        if self.range.max_secs <= self.range.min_secs {
            return Duration::from_secs_f64(self.range.min_secs);
        }
        let secs = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(self.range.min_secs..=self.range.max_secs),
            // a poisoned rng is still a usable rng
            Err(poisoned) => poisoned
                .into_inner()
                .gen_range(self.range.min_secs..=self.range.max_secs),
        };
        Duration::from_secs_f64(secs)
    }

    /// Sleep for a freshly drawn delay.
    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
