//! Sliding-window rate limiter and duplicate-message spam filter.
//!
//! Both are keyed by `(subject, channel)` and sit on top of the bounded
//! [`SlidingWindow`] store.

use crate::window::SlidingWindow;
use std::time::{Duration, Instant};

/// `(subject_id, channel_id)` pair.
pub type ChannelKey = (String, String);

/// Rate limiter with a configurable per-key limit and window duration.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum events allowed within the window.
    max_events: usize,
    /// Per-key event timestamps.
    events: SlidingWindow<ChannelKey>,
}

impl RateLimiter {
    pub fn new(max_events: usize, window: Duration, max_keys: usize) -> Self {
        Self {
            max_events,
            events: SlidingWindow::new(window, max_keys),
        }
    }

    /// Check if an event is allowed for `key` at `now`, and record it if so.
    ///
    /// Returns `true` if allowed, `false` if rate-limited. A rejected event
    /// is not recorded.
    pub fn check_and_record(&mut self, key: &ChannelKey, now: Instant) -> bool {
        if self.events.count(key, now) >= self.max_events {
            return false;
        }
        self.events.record(key.clone(), now, ());
        true
    }

    pub fn gc(&mut self, now: Instant) {
        self.events.gc(now);
    }

    pub fn tracked_keys(&self) -> usize {
        self.events.len()
    }
}

/// Flags a message as spam once the same text was seen `limit` times inside
/// the window for one key.
#[derive(Debug)]
pub struct SpamFilter {
    limit: usize,
    history: SlidingWindow<ChannelKey, String>,
}

impl SpamFilter {
    pub fn new(limit: usize, window: Duration, max_keys: usize) -> Self {
        Self {
            limit,
            history: SlidingWindow::new(window, max_keys),
        }
    }

    /// Append `message` to the key's history and report whether it is spam.
    ///
    /// The count includes the message just appended, so the `limit`-th
    /// identical message inside the window is the first one flagged.
    pub fn record_and_check(&mut self, key: &ChannelKey, message: &str, now: Instant) -> bool {
        self.history.record(key.clone(), now, message.to_string());
        let identical = self.history.count_matching(key, now, |m| m == message);
        identical >= self.limit
    }

    pub fn gc(&mut self, now: Instant) {
        self.history.gc(now);
    }

    pub fn tracked_keys(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str, c: &str) -> ChannelKey {
        (s.to_string(), c.to_string())
    }

    #[test]
    fn test_rate_limit_per_key() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10), 64);
        let t0 = Instant::now();
        assert!(limiter.check_and_record(&key("u1", "c1"), t0));
        assert!(limiter.check_and_record(&key("u1", "c1"), t0));
        assert!(!limiter.check_and_record(&key("u1", "c1"), t0));
        // Other channel has its own budget
        assert!(limiter.check_and_record(&key("u1", "c2"), t0));
    }

    #[test]
    fn test_rejected_events_are_not_recorded() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(10), 64);
        let t0 = Instant::now();
        assert!(limiter.check_and_record(&key("u", "c"), t0));
        assert!(!limiter.check_and_record(&key("u", "c"), t0 + Duration::from_secs(9)));
        // Only the first event counts, so the budget returns at t0 + 10s
        assert!(limiter.check_and_record(&key("u", "c"), t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_spam_counts_exact_text() {
        let mut filter = SpamFilter::new(3, Duration::from_secs(5), 64);
        let t0 = Instant::now();
        let k = key("u", "c");
        assert!(!filter.record_and_check(&k, "buy now", t0));
        assert!(!filter.record_and_check(&k, "hello", t0));
        assert!(!filter.record_and_check(&k, "buy now", t0));
        assert!(filter.record_and_check(&k, "buy now", t0));
        assert!(!filter.record_and_check(&k, "hello", t0));
    }

    #[test]
    fn test_spam_window_expires() {
        let mut filter = SpamFilter::new(2, Duration::from_secs(5), 64);
        let t0 = Instant::now();
        let k = key("u", "c");
        assert!(!filter.record_and_check(&k, "same", t0));
        assert!(!filter.record_and_check(&k, "same", t0 + Duration::from_secs(6)));
        assert!(filter.record_and_check(&k, "same", t0 + Duration::from_secs(7)));
    }
}
