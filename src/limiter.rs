//! # Outbound call-rate limiting.
//!
//! [`RateLimiter`] gates every outbound call against two mechanisms:
//!
//! - **Rolling window** — per-endpoint timestamps of recent calls; a request
//!   is allowed while `recorded + count` stays within the endpoint's ceiling
//!   over the window (15 minutes by default).
//! - **Fixed post budget** — the posting service exposes no remaining-budget
//!   signal for status updates, so an explicit budget (300 by default) is
//!   kept, resetting to full once more than the reset interval (3 hours by
//!   default) has elapsed since the last reset.
//!
//! Checking never records: `can_do_request` / `can_post` answer a boolean
//! and the caller records the call separately, after it actually happened,
//! via `record_request` / `record_post`. The limiter never errors.
//!
//! Post-class endpoints (`/statuses/update`, `/statuses/retweet`,
//! `/statuses/retweet/<id>`) are routed to the post budget.
//!
//! ## Example
//! ```
//! use magpie::RateLimiter;
//!
//! let limiter = RateLimiter::default().with_ceiling("/statuses/mentions_timeline", 2);
//!
//! assert!(limiter.can_do_request("/statuses/mentions_timeline", 1));
//! limiter.record_request("/statuses/mentions_timeline");
//! limiter.record_request("/statuses/mentions_timeline");
//! assert!(!limiter.can_do_request("/statuses/mentions_timeline", 1));
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default rolling-window length.
pub const WINDOW: Duration = Duration::from_secs(15 * 60);
/// Default per-endpoint ceiling within one window.
pub const DEFAULT_CEILING: u32 = 15;
/// Default fixed budget for post-class actions.
pub const POST_BUDGET: u32 = 300;
/// Default interval after which the post budget resets to full.
pub const POST_RESET_EVERY: Duration = Duration::from_secs(3 * 60 * 60);

struct PostBudget {
    limit: u32,
    remaining: u32,
    reset_every: Duration,
    last_reset: Instant,
}

impl PostBudget {
    /// Refills the budget when the reset interval has elapsed.
    fn apply_pending_reset(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_reset) > self.reset_every {
            self.remaining = self.limit;
            self.last_reset = now;
        }
    }
}

/// Per-endpoint rolling-window counters plus a fixed post budget.
pub struct RateLimiter {
    window: Duration,
    default_ceiling: u32,
    ceilings: HashMap<String, u32>,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
    post: Mutex<PostBudget>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(WINDOW, DEFAULT_CEILING, POST_BUDGET, POST_RESET_EVERY)
    }
}

impl RateLimiter {
    /// Creates a limiter with explicit window, default ceiling, post budget,
    /// and post-budget reset interval.
    pub fn new(
        window: Duration,
        default_ceiling: u32,
        post_budget: u32,
        post_reset_every: Duration,
    ) -> Self {
        Self {
            window,
            default_ceiling,
            ceilings: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            post: Mutex::new(PostBudget {
                limit: post_budget,
                remaining: post_budget,
                reset_every: post_reset_every,
                last_reset: Instant::now(),
            }),
        }
    }

    /// Overrides the ceiling for one endpoint.
    pub fn with_ceiling(mut self, endpoint: impl Into<String>, ceiling: u32) -> Self {
        self.ceilings.insert(endpoint.into(), ceiling);
        self
    }

    /// Whether `count` more calls to `endpoint` fit the current window.
    ///
    /// Does not record anything; the caller records actually-performed
    /// calls via [`record_request`](RateLimiter::record_request).
    pub fn can_do_request(&self, endpoint: &str, count: u32) -> bool {
        self.can_do_request_at(endpoint, count, Instant::now())
    }

    /// Records `count == 1` performed call to `endpoint`.
    pub fn record_request(&self, endpoint: &str) {
        self.record_request_at(endpoint, Instant::now());
    }

    /// Whether `count` more post-class actions fit the remaining budget.
    ///
    /// Applies a pending budget reset first. Requesting more than the
    /// remaining budget answers `false` with no further side effect.
    pub fn can_post(&self, count: u32) -> bool {
        self.can_post_at(count, Instant::now())
    }

    /// Records `count` performed post-class actions, saturating at zero.
    pub fn record_post(&self, count: u32) {
        self.record_post_at(count, Instant::now());
    }

    /// Remaining post budget after applying any pending reset.
    pub fn remaining_posts(&self) -> u32 {
        self.remaining_posts_at(Instant::now())
    }

    // Clock-explicit variants. All public checks delegate here so the
    // arithmetic is testable without waiting out real windows.

    pub(crate) fn can_do_request_at(&self, endpoint: &str, count: u32, now: Instant) -> bool {
        if Self::is_post_endpoint(endpoint) {
            return self.can_post_at(count, now);
        }
        let mut calls = self.lock_calls();
        let recorded = match calls.get_mut(endpoint) {
            Some(timestamps) => {
                Self::prune(timestamps, self.window, now);
                timestamps.len() as u32
            }
            None => 0,
        };
        recorded.saturating_add(count) <= self.ceiling_for(endpoint)
    }

    pub(crate) fn record_request_at(&self, endpoint: &str, now: Instant) {
        if Self::is_post_endpoint(endpoint) {
            self.record_post_at(1, now);
            return;
        }
        let mut calls = self.lock_calls();
        let timestamps = calls.entry(endpoint.to_string()).or_default();
        Self::prune(timestamps, self.window, now);
        timestamps.push_back(now);
    }

    pub(crate) fn can_post_at(&self, count: u32, now: Instant) -> bool {
        let mut post = self.lock_post();
        post.apply_pending_reset(now);
        count <= post.remaining
    }

    pub(crate) fn record_post_at(&self, count: u32, now: Instant) {
        let mut post = self.lock_post();
        post.apply_pending_reset(now);
        post.remaining = post.remaining.saturating_sub(count);
    }

    pub(crate) fn remaining_posts_at(&self, now: Instant) -> u32 {
        let mut post = self.lock_post();
        post.apply_pending_reset(now);
        post.remaining
    }

    fn ceiling_for(&self, endpoint: &str) -> u32 {
        self.ceilings
            .get(endpoint)
            .copied()
            .unwrap_or(self.default_ceiling)
    }

    fn is_post_endpoint(endpoint: &str) -> bool {
        endpoint == "/statuses/update"
            || endpoint == "/statuses/retweet"
            || endpoint.starts_with("/statuses/retweet/")
    }

    fn prune(timestamps: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_post(&self) -> std::sync::MutexGuard<'_, PostBudget> {
        self.post.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(ceiling: u32) -> RateLimiter {
        RateLimiter::new(WINDOW, ceiling, POST_BUDGET, POST_RESET_EVERY)
    }

    #[test]
    fn allows_exactly_ceiling_calls_within_one_window() {
        let limiter = limiter(5);
        let now = Instant::now();

        for i in 0..5 {
            assert!(
                limiter.can_do_request_at("/search", 1, now),
                "call {} should fit",
                i
            );
            limiter.record_request_at("/search", now);
        }
        assert!(!limiter.can_do_request_at("/search", 1, now));
    }

    #[test]
    fn denies_until_oldest_timestamp_exits_window() {
        let limiter = limiter(2);
        let start = Instant::now();

        limiter.record_request_at("/search", start);
        limiter.record_request_at("/search", start + Duration::from_secs(60));
        assert!(!limiter.can_do_request_at("/search", 1, start + Duration::from_secs(120)));

        // First timestamp leaves the window; one slot opens up.
        let after_window = start + WINDOW;
        assert!(limiter.can_do_request_at("/search", 1, after_window));
        assert!(!limiter.can_do_request_at("/search", 2, after_window));
    }

    #[test]
    fn checking_does_not_consume_budget_or_window() {
        let limiter = limiter(1);
        let now = Instant::now();

        for _ in 0..10 {
            assert!(limiter.can_do_request_at("/search", 1, now));
        }
        assert!(limiter.can_post_at(1, now));
        assert_eq!(limiter.remaining_posts_at(now), POST_BUDGET);
    }

    #[test]
    fn batch_count_respects_ceiling() {
        let limiter = limiter(10);
        let now = Instant::now();

        assert!(limiter.can_do_request_at("/search", 10, now));
        assert!(!limiter.can_do_request_at("/search", 11, now));
    }

    #[test]
    fn post_budget_exhausts_and_resets_after_interval() {
        let limiter = limiter(15);
        let start = Instant::now();

        for _ in 0..POST_BUDGET {
            assert!(limiter.can_post_at(1, start));
            limiter.record_post_at(1, start);
        }
        assert!(!limiter.can_post_at(1, start));
        assert_eq!(limiter.remaining_posts_at(start), 0);

        let later = start + POST_RESET_EVERY + Duration::from_secs(1);
        assert!(limiter.can_post_at(1, later));
        assert_eq!(limiter.remaining_posts_at(later), POST_BUDGET);
    }

    #[test]
    fn over_budget_request_has_no_side_effect() {
        let limiter = limiter(15);
        let now = Instant::now();

        limiter.record_post_at(POST_BUDGET - 1, now);
        assert!(!limiter.can_post_at(2, now));
        assert_eq!(limiter.remaining_posts_at(now), 1);
        assert!(limiter.can_post_at(1, now));
    }

    #[test]
    fn post_endpoints_route_to_the_post_budget() {
        let limiter = limiter(15);
        let now = Instant::now();

        assert!(limiter.can_do_request_at("/statuses/update", 1, now));
        limiter.record_request_at("/statuses/update", now);
        limiter.record_request_at("/statuses/retweet/12345", now);
        assert_eq!(limiter.remaining_posts_at(now), POST_BUDGET - 2);
    }

    #[test]
    fn endpoints_are_limited_independently() {
        let limiter = limiter(1);
        let now = Instant::now();

        limiter.record_request_at("/a", now);
        assert!(!limiter.can_do_request_at("/a", 1, now));
        assert!(limiter.can_do_request_at("/b", 1, now));
    }
}
