//! Fixed-window admission control keyed by arbitrary strings.
//!
//! Each key owns a counter and the instant its window opened. A call inside
//! the window is admitted while the counter is below the limit; the first
//! call at or after `window_start + window` opens a fresh window. Budgets are
//! passed per call, so two call sites may share a key namespace with
//! different limits.
//!
//! The check-and-increment for a key runs while holding that key's shard
//! lock, so the count never exceeds the limit inside one window even when
//! callers run on several threads.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::models::RateWindow;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Admissions left in the current window after this call.
    pub remaining: u32,
    /// Time until the current window rolls over.
    pub reset_after: Duration,
}

impl RateDecision {
    fn rejected(limit: u32, reset_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_after,
        }
    }
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject one call for `key`, at most `limit` per `window`.
    pub fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        self.allow_at(key, limit, window, Instant::now())
    }

    pub fn allow_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> bool {
        self.check_at(key, limit, window, now).allowed
    }

    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_at(key, limit, window, Instant::now())
    }

    /// Full admission decision evaluated at `now`.
    ///
    /// A zero `limit` or zero `window` is rejected without touching the
    /// record for `key`.
    pub fn check_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> RateDecision {
        if limit == 0 || window.is_zero() {
            warn!(key, limit, window_ms = window.as_millis() as u64, "rejecting malformed rate limit budget");
            return RateDecision::rejected(limit, Duration::ZERO);
        }

        match self.windows.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateWindow::open(now, window));
                debug!(key, limit, "opened rate window");
                RateDecision {
                    allowed: true,
                    limit,
                    remaining: limit - 1,
                    reset_after: window,
                }
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                let elapsed = now.saturating_duration_since(record.window_start);

                if elapsed >= window {
                    *record = RateWindow::open(now, window);
                    debug!(key, limit, "rate window reset");
                    return RateDecision {
                        allowed: true,
                        limit,
                        remaining: limit - 1,
                        reset_after: window,
                    };
                }

                // The caller's budget wins over the one recorded at open time.
                record.window = window;
                let reset_after = window - elapsed;
                if record.count < limit {
                    record.count += 1;
                    RateDecision {
                        allowed: true,
                        limit,
                        remaining: limit - record.count,
                        reset_after,
                    }
                } else {
                    if record.rejections == 0 {
                        warn!(key, limit, "rate limit exceeded");
                    } else {
                        debug!(key, limit, rejections = record.rejections + 1, "rate limit still exceeded");
                    }
                    record.rejections = record.rejections.saturating_add(1);
                    RateDecision::rejected(limit, reset_after)
                }
            }
        }
    }

    /// Drop every record whose window has already elapsed at `now`.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn reset(&self, key: &str) -> bool {
        self.windows.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    fn advance(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("login:10.0.0.1", 5, MINUTE, now));
        }
        assert!(!limiter.allow_at("login:10.0.0.1", 5, MINUTE, now));
    }

    #[test]
    fn test_login_scenario_resets_after_window() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for i in 0..10 {
            assert!(limiter.allow_at("login:1.2.3.4", 10, MINUTE, advance(start, i)));
        }
        assert!(!limiter.allow_at("login:1.2.3.4", 10, MINUTE, advance(start, 10)));

        assert!(limiter.allow_at("login:1.2.3.4", 10, MINUTE, advance(start, 60_001)));
    }

    #[test]
    fn test_reset_exactly_at_window_boundary() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.allow_at("k", 1, MINUTE, start));
        assert!(!limiter.allow_at("k", 1, MINUTE, advance(start, 59_999)));
        assert!(limiter.allow_at("k", 1, MINUTE, advance(start, 60_000)));
    }

    #[test]
    fn test_rejections_do_not_delay_reset() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.allow_at("k", 2, MINUTE, start));
        assert!(limiter.allow_at("k", 2, MINUTE, start));
        for i in 1..50 {
            assert!(!limiter.allow_at("k", 2, MINUTE, advance(start, i * 1_000)));
        }

        let decision = limiter.check_at("k", 2, MINUTE, advance(start, 60_000));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_rejections_are_counted_per_window() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.allow_at("k", 1, MINUTE, start);
        for _ in 0..3 {
            assert!(!limiter.allow_at("k", 1, MINUTE, start));
        }
        assert_eq!(limiter.windows.get("k").unwrap().rejections, 3);

        assert!(limiter.allow_at("k", 1, MINUTE, advance(start, 60_000)));
        assert_eq!(limiter.windows.get("k").unwrap().rejections, 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.allow_at("external:github:1.1.1.1", 1, MINUTE, now));
        assert!(!limiter.allow_at("external:github:1.1.1.1", 1, MINUTE, now));

        assert!(limiter.allow_at("external:github:2.2.2.2", 1, MINUTE, now));
        assert!(limiter.allow_at("login:1.1.1.1", 1, MINUTE, now));
        assert_eq!(limiter.len(), 3);
    }

    #[test]
    fn test_fixed_window_allows_boundary_burst() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.allow_at("k", 3, MINUTE, start));
        let late = advance(start, 59_000);
        assert!(limiter.allow_at("k", 3, MINUTE, late));
        assert!(limiter.allow_at("k", 3, MINUTE, late));

        let next = advance(start, 60_000);
        for _ in 0..3 {
            assert!(limiter.allow_at("k", 3, MINUTE, next));
        }
        assert!(!limiter.allow_at("k", 3, MINUTE, next));
    }

    #[test]
    fn test_decision_reports_remaining_and_reset() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        let first = limiter.check_at("k", 3, MINUTE, start);
        assert_eq!(first.remaining, 2);
        assert_eq!(first.reset_after, MINUTE);

        let second = limiter.check_at("k", 3, MINUTE, advance(start, 15_000));
        assert_eq!(second.remaining, 1);
        assert_eq!(second.reset_after, Duration::from_secs(45));

        limiter.check_at("k", 3, MINUTE, advance(start, 20_000));
        let rejected = limiter.check_at("k", 3, MINUTE, advance(start, 30_000));
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_after, Duration::from_secs(30));
    }

    #[test]
    fn test_malformed_budget_is_rejected() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(!limiter.allow_at("k", 0, MINUTE, now));
        assert!(!limiter.allow_at("k", 5, Duration::ZERO, now));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_purge_expired_drops_only_elapsed_windows() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.allow_at("short", 1, Duration::from_secs(1), start);
        limiter.allow_at("long", 1, MINUTE, start);

        assert_eq!(limiter.purge_expired_at(advance(start, 500)), 0);
        assert_eq!(limiter.purge_expired_at(advance(start, 2_000)), 1);
        assert_eq!(limiter.len(), 1);

        assert!(limiter.reset("long"));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_concurrent_calls_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new());
        let admitted = Arc::new(AtomicU32::new(0));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if limiter.allow_at("ai:9.9.9.9", 50, MINUTE, now) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 50);
    }
}
