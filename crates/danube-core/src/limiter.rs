//! Minimum-spacing request rate limiter.
//!
//! The server advertises a maximum request rate per minute; this gate
//! enforces a fixed minimum interval between consecutive requests.
//! Deliberately simple: no burst allowance and no token bucket, just strict
//! spacing with one request of slack left in the computed interval.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Spacing gate applied before every HTTP attempt.
///
/// The last-request timestamp is shared mutable state; it lives behind an
/// async mutex held across the sleep, so concurrent callers on the same
/// client are serialized through the gate rather than racing it.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter from the server-advertised requests-per-minute cap.
    ///
    /// The interval is `60s / (max_requests_per_minute - 1)`, leaving one
    /// request of slack under the server's limit. Rates below 2 are clamped.
    #[must_use]
    pub fn new(max_requests_per_minute: u32) -> Self {
        let slots = max_requests_per_minute.max(2) - 1;
        Self::with_min_interval(Duration::from_secs(60) / slots)
    }

    /// Create a limiter with an explicit minimum interval.
    #[must_use]
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// The enforced minimum spacing between requests.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the minimum interval since the previous request has
    /// passed, then stamp the current time.
    ///
    /// The timestamp is taken immediately before the request is issued, not
    /// after the response arrives, so slow responses do not inflate the
    /// allowed rate.
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
