use std::sync::Arc;

use crate::store::{SharedStore, StoreError};

pub const RATE_LIMIT_KEY: &str = "rate_limit:global";

/// Global sliding-window limiter: at most `max_requests` admissions in any
/// trailing `window_seconds` interval, shared by every caller.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    max_requests: u64,
    window_seconds: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, max_requests: u64, window_seconds: u64) -> Self {
        Self {
            store,
            max_requests,
            window_seconds,
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Returns `true` when the request is admitted. Store failures are
    /// returned to the caller untouched.
    pub async fn check(&self) -> Result<bool, StoreError> {
        self.check_at(now_epoch_seconds()).await
    }

    pub async fn check_at(&self, now: f64) -> Result<bool, StoreError> {
        // Prune before counting, otherwise stale entries reject a request
        // the window would admit.
        self.store
            .zrem_range_by_score(RATE_LIMIT_KEY, window_start(now, self.window_seconds))
            .await?;

        let current_count = self.store.zcard(RATE_LIMIT_KEY).await?;
        if current_count >= self.max_requests {
            tracing::debug!(current_count, max = self.max_requests, "Rate limit reached");
            return Ok(false);
        }

        self.store
            .zadd(RATE_LIMIT_KEY, &window_member(now), now)
            .await?;
        self.store
            .expire(RATE_LIMIT_KEY, self.window_seconds)
            .await?;

        Ok(true)
    }
}

pub fn window_start(now: f64, window_seconds: u64) -> f64 {
    now - window_seconds as f64
}

/// Sorted-set member for one admission. The random suffix keeps two
/// admissions in the same microsecond from collapsing into one entry.
pub fn window_member(now: f64) -> String {
    format!("{:.6}-{:08x}", now, fastrand::u32(..))
}

fn now_epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
