//! Per-recipient sliding-window send limiter.
//!
//! Keeps outbound volume per recipient under a cap inside a rolling
//! window. Entry count is bounded: when the map fills up, windows whose
//! every timestamp has already expired are evicted before admitting a
//! new recipient.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct RateLimiter {
    windows: DashMap<String, Vec<Instant>>,
    window: Duration,
    max_sends: usize,
    max_entries: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_sends: usize, max_entries: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_sends,
            max_entries,
        }
    }

    /// Whether `recipient` has quota left in its window right now.
    ///
    /// Read-only: quota is consumed by `record`, so a send that later
    /// fails or times out never counts against the window.
    pub fn admits(&self, recipient: &str) -> bool {
        self.admits_at(recipient, Instant::now())
    }

    fn admits_at(&self, recipient: &str, now: Instant) -> bool {
        match self.windows.get_mut(recipient) {
            Some(mut entry) => {
                entry.retain(|stamp| now.duration_since(*stamp) < self.window);
                entry.len() < self.max_sends
            }
            None => true,
        }
    }

    /// Count one delivered send against `recipient`'s window.
    pub fn record(&self, recipient: &str) {
        self.record_at(recipient, Instant::now());
    }

    fn record_at(&self, recipient: &str, now: Instant) {
        if !self.windows.contains_key(recipient) && self.windows.len() >= self.max_entries {
            self.evict_expired(now);
        }

        let mut entry = self.windows.entry(recipient.to_string()).or_default();
        entry.retain(|stamp| now.duration_since(*stamp) < self.window);
        entry.push(now);
    }

    fn evict_expired(&self, now: Instant) {
        self.windows.retain(|_, stamps| {
            stamps
                .iter()
                .any(|stamp| now.duration_since(*stamp) < self.window)
        });
    }

    #[cfg(test)]
    fn entries(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_cap() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3, 100);
        for _ in 0..3 {
            assert!(limiter.admits("a"));
            limiter.record("a");
        }
        assert!(!limiter.admits("a"));
    }

    #[test]
    fn test_admits_alone_consumes_nothing() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1, 100);
        for _ in 0..10 {
            assert!(limiter.admits("a"));
        }
        limiter.record("a");
        assert!(!limiter.admits("a"));
    }

    #[test]
    fn test_recipients_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1, 100);
        limiter.record("a");
        assert!(!limiter.admits("a"));
        assert!(limiter.admits("b"));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(Duration::from_millis(100), 1, 100);
        let start = Instant::now();
        limiter.record_at("a", start);
        assert!(!limiter.admits_at("a", start + Duration::from_millis(50)));
        assert!(limiter.admits_at("a", start + Duration::from_millis(150)));
    }

    #[test]
    fn test_eviction_bounds_entries() {
        let limiter = RateLimiter::new(Duration::from_millis(100), 5, 2);
        let start = Instant::now();
        limiter.record_at("a", start);
        limiter.record_at("b", start);
        assert_eq!(limiter.entries(), 2);

        // Both windows expired; the new recipient triggers eviction
        let later = start + Duration::from_millis(200);
        limiter.record_at("c", later);
        assert_eq!(limiter.entries(), 1);
    }

    #[test]
    fn test_live_entries_survive_eviction() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 5, 1);
        let start = Instant::now();
        limiter.record_at("a", start);
        // Map is full and "a" is still live; "b" is admitted anyway (soft cap)
        limiter.record_at("b", start + Duration::from_millis(1));
        assert_eq!(limiter.entries(), 2);
    }
}
