//! Per-bucket request bookkeeping and the limiter clock.

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

use super::key::RateLimiterKey;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Clock backed by tokio's monotonic clock, anchored to the wall clock
/// when created.
///
/// Follows tokio's time controls, so a paused runtime also pauses the
/// limiter's notion of time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
    origin_millis: i64,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_millis: Utc::now().timestamp_millis(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.origin_millis + self.origin.elapsed().as_millis() as i64
    }
}

/// Request history for one throttling bucket.
///
/// Entries are mutated through `&mut self`, so whoever records a request
/// must own the lock guarding the entry for the whole wait-then-record step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimiterEntry {
    key: RateLimiterKey,
    first_request_time: i64,
    last_request_time: i64,
    request_count: u64,
}

impl RateLimiterEntry {
    /// Create an entry with no recorded requests.
    pub fn new(key: RateLimiterKey) -> Self {
        Self {
            key,
            first_request_time: 0,
            last_request_time: 0,
            request_count: 0,
        }
    }

    pub fn key(&self) -> &RateLimiterKey {
        &self.key
    }

    /// Epoch millis of the first recorded request, 0 if none.
    pub fn first_request_time(&self) -> i64 {
        self.first_request_time
    }

    /// Epoch millis of the latest recorded request, 0 if none.
    pub fn last_request_time(&self) -> i64 {
        self.last_request_time
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Record a request sent at `now_millis`.
    pub fn record_request(&mut self, now_millis: i64) {
        if self.request_count == 0 {
            self.first_request_time = now_millis;
        }
        self.request_count += 1;
        self.last_request_time = now_millis;
    }

    /// Achieved rate over the recorded history, rounded up.
    ///
    /// Returns `None` until two requests at least a millisecond apart have
    /// been recorded. For display only.
    pub fn effective_requests_per_second(&self) -> Option<u64> {
        let elapsed = self.last_request_time - self.first_request_time;
        if elapsed <= 0 || self.request_count == 0 {
            return None;
        }
        let seconds = (elapsed as u64).div_ceil(1000);
        Some(self.request_count.div_ceil(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RateLimiterEntry {
        RateLimiterEntry::new(RateLimiterKey::new("rule", "example.com"))
    }

    #[test]
    fn test_fresh_entry_is_empty() {
        let entry = entry();

        assert_eq!(entry.request_count(), 0);
        assert_eq!(entry.first_request_time(), 0);
        assert_eq!(entry.last_request_time(), 0);
        assert_eq!(entry.effective_requests_per_second(), None);
    }

    #[test]
    fn test_first_request_sets_both_times() {
        let mut entry = entry();

        entry.record_request(1_000);

        assert_eq!(entry.request_count(), 1);
        assert_eq!(entry.first_request_time(), 1_000);
        assert_eq!(entry.last_request_time(), 1_000);
    }

    #[test]
    fn test_later_requests_keep_first_time() {
        let mut entry = entry();

        entry.record_request(1_000);
        entry.record_request(1_500);
        entry.record_request(2_250);

        assert_eq!(entry.request_count(), 3);
        assert_eq!(entry.first_request_time(), 1_000);
        assert_eq!(entry.last_request_time(), 2_250);
    }

    #[test]
    fn test_single_request_has_no_rate() {
        let mut entry = entry();
        entry.record_request(5_000);

        assert_eq!(entry.effective_requests_per_second(), None);
    }

    #[test]
    fn test_effective_rate_rounds_up() {
        let mut entry = entry();
        // 5 requests over 1.5s: ceil(1.5) = 2 seconds, ceil(5 / 2) = 3
        for t in [0, 400, 800, 1_200, 1_500] {
            entry.record_request(10_000 + t);
        }

        assert_eq!(entry.effective_requests_per_second(), Some(3));
    }

    #[test]
    fn test_effective_rate_sub_second() {
        let mut entry = entry();
        entry.record_request(10_000);
        entry.record_request(10_500);

        assert_eq!(entry.effective_requests_per_second(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        let start = clock.now_millis();

        tokio::time::advance(std::time::Duration::from_millis(750)).await;

        assert_eq!(clock.now_millis() - start, 750);
    }
}
