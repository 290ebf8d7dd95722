//! Token-bucket limiter for outbound API calls.
//!
//! The bucket holds at most `capacity` tokens and refills continuously at
//! `requests_per_minute / 60` tokens per second. Callers poll:
//! [`TokenBucket::acquire`] sleeps until the next token is due and then tries
//! again, so there is no queue and no fairness between callers. Whoever polls
//! first after a refill gets the token.
//!
//! When the remote API reports its own budget through rate-limit headers,
//! [`TokenBucket::apply_headers`] overwrites the local count with the server's
//! numbers. That makes the bucket advisory: it keeps us polite, it does not
//! guarantee we never see a 429.

use reqwest::header::HeaderMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// Remaining-count threshold below which header updates log a warning.
const LOW_REMAINING_WARNING: f64 = 5.0;

/// Snapshot of the bucket returned by [`TokenBucket::status`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStatus {
    pub tokens: f64,
    pub capacity: f64,
    pub can_make_request: bool,
    pub next_token_in: Duration,
}

/// Rate-limit information reported by the remote API.
///
/// Reddit sends `x-ratelimit-remaining` (float), `x-ratelimit-used` and
/// `x-ratelimit-reset` (seconds until the current window resets).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub remaining: Option<f64>,
    pub used: Option<u64>,
    pub reset_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Parse the rate-limit headers out of a response. Missing or malformed
    /// values are left as `None`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn parse<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }

        let non_negative = |v: &f64| v.is_finite() && *v >= 0.0;
        Self {
            remaining: parse::<f64>(headers, "x-ratelimit-remaining").filter(non_negative),
            used: parse::<f64>(headers, "x-ratelimit-used")
                .filter(non_negative)
                .map(|v| v as u64),
            reset_after: parse::<f64>(headers, "x-ratelimit-reset")
                .filter(non_negative)
                .map(Duration::from_secs_f64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.used.is_none() && self.reset_after.is_none()
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// Set when the server reported an exhausted window; no refill until then.
    blocked_until: Option<Instant>,
}

/// A polling token bucket. See the module docs for semantics.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket allowing `requests_per_minute` sustained requests with
    /// bursts of up to `burst` (default: a quarter of the per-minute rate).
    pub fn new(requests_per_minute: u32, burst: Option<u32>) -> Self {
        let rpm = requests_per_minute.max(1);
        let capacity = f64::from(burst.unwrap_or(rpm / 4).max(1));
        let refill_per_sec = f64::from(rpm) / 60.0;

        info!(
            requests_per_minute = rpm,
            capacity,
            refill_per_sec,
            "TokenBucket initialized"
        );

        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                blocked_until: None,
            }),
        }
    }

    /// Burst size: the most tokens the bucket holds.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if let Some(until) = state.blocked_until {
            if now < until {
                return;
            }
            // Server window has reset.
            state.blocked_until = None;
            state.tokens = self.capacity;
            state.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    fn time_to_next_token(&self, state: &BucketState, now: Instant) -> Duration {
        if let Some(until) = state.blocked_until {
            return until.saturating_duration_since(now);
        }
        if state.tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
    }

    /// Take a token if one is available, otherwise return how long until the
    /// next one is due.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut state = self.lock();
        self.refill(&mut state, now);

        if state.blocked_until.is_none() && state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            Err(self.time_to_next_token(&state, now))
        }
    }

    /// Wait until a token is available and take it.
    #[instrument(level = "debug", skip(self))]
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "No token available; waiting");
                    sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Refill, then report the current state without taking a token.
    ///
    /// # Returns
    ///
    /// A [`BucketStatus`]. `next_token_in` is the remaining server block when
    /// one is active, zero when a token is available now.
    pub fn status(&self) -> BucketStatus {
        let now = Instant::now();
        let mut state = self.lock();
        self.refill(&mut state, now);

        BucketStatus {
            tokens: state.tokens,
            capacity: self.capacity,
            can_make_request: state.blocked_until.is_none() && state.tokens >= 1.0,
            next_token_in: self.time_to_next_token(&state, now),
        }
    }

    /// Overwrite local accounting with what the server reported.
    ///
    /// `remaining` replaces the local token count (capped at capacity). A
    /// remaining budget below one with a reset time blocks the bucket until
    /// the reset; any later report of remaining budget lifts the block.
    pub fn apply_headers(&self, info: &RateLimitHeaders) {
        if info.is_empty() {
            return;
        }
        debug!(
            remaining = ?info.remaining,
            used = ?info.used,
            reset_after_ms = ?info.reset_after.map(|d| d.as_millis() as u64),
            "Remote rate limit info"
        );

        let Some(remaining) = info.remaining else {
            return;
        };
        if remaining < LOW_REMAINING_WARNING {
            warn!(remaining, "Approaching remote rate limit");
        }

        let now = Instant::now();
        let mut state = self.lock();
        self.refill(&mut state, now);
        state.tokens = remaining.min(self.capacity);
        state.last_refill = now;

        if remaining >= 1.0 {
            // Capacity is back; an earlier exhausted window no longer applies.
            state.blocked_until = None;
        } else if let Some(reset) = info.reset_after {
            state.blocked_until = Some(now + reset);
        }
    }

    /// Convenience wrapper for [`TokenBucket::apply_headers`] on a raw header map.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        self.apply_headers(&RateLimitHeaders::from_headers(headers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tokio::time::advance;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_status_is_full() {
        let bucket = TokenBucket::new(60, Some(15));
        let status = bucket.status();
        assert_eq!(status.tokens, 15.0);
        assert_eq!(status.capacity, 15.0);
        assert!(status.can_make_request);
        assert_eq!(status.next_token_in, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_burst_is_quarter_of_rate() {
        assert_eq!(TokenBucket::new(60, None).capacity(), 15.0);
        assert_eq!(TokenBucket::new(2, None).capacity(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_depletion_blocks_requests() {
        let bucket = TokenBucket::new(60, Some(2));
        bucket.acquire().await;
        bucket.acquire().await;

        let status = bucket.status();
        assert!(status.tokens < 1.0);
        assert!(!status.can_make_request);
        assert!(status.next_token_in > Duration::ZERO);
        assert!(status.next_token_in <= Duration::from_secs(1));
        assert!(bucket.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        // One token per second, burst of one.
        let bucket = TokenBucket::new(60, Some(1));
        bucket.acquire().await;

        let started = Instant::now();
        bucket.acquire().await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(990), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(1100), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let bucket = TokenBucket::new(120, Some(5));
        advance(Duration::from_secs(600)).await;
        assert_eq!(bucket.status().tokens, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_monotonic() {
        let bucket = TokenBucket::new(60, Some(10));
        for _ in 0..10 {
            bucket.acquire().await;
        }

        let mut last = bucket.status().tokens;
        for _ in 0..20 {
            advance(Duration::from_millis(700)).await;
            let now = bucket.status().tokens;
            assert!(now >= last);
            assert!(now <= 10.0);
            last = now;
        }
        assert_eq!(last, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_never_exceeded_in_a_tight_loop() {
        let bucket = TokenBucket::new(60, Some(3));
        let granted = (0..10).filter(|_| bucket.try_acquire().is_ok()).count();
        assert_eq!(granted, 3);
    }

    #[test]
    fn test_parse_reddit_headers() {
        let map = headers(&[
            ("x-ratelimit-remaining", "45.0"),
            ("x-ratelimit-used", "15"),
            ("x-ratelimit-reset", "60"),
        ]);
        let info = RateLimitHeaders::from_headers(&map);
        assert_eq!(info.remaining, Some(45.0));
        assert_eq!(info.used, Some(15));
        assert_eq!(info.reset_after, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_missing_and_malformed_headers() {
        assert!(RateLimitHeaders::from_headers(&HeaderMap::new()).is_empty());

        let map = headers(&[("x-ratelimit-remaining", "lots"), ("x-ratelimit-reset", "-3")]);
        assert!(RateLimitHeaders::from_headers(&map).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers_overwrite_local_count() {
        let bucket = TokenBucket::new(60, Some(15));
        bucket.update_from_headers(&headers(&[
            ("x-ratelimit-remaining", "3"),
            ("x-ratelimit-used", "57"),
            ("x-ratelimit-reset", "60"),
        ]));
        assert_eq!(bucket.status().tokens, 3.0);

        // A generous server budget is still clamped to capacity.
        bucket.update_from_headers(&headers(&[("x-ratelimit-remaining", "590")]));
        assert_eq!(bucket.status().tokens, 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_window_blocks_until_reset() {
        let bucket = TokenBucket::new(60, Some(15));
        bucket.update_from_headers(&headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "30"),
        ]));

        let wait = bucket.try_acquire().unwrap_err();
        assert_eq!(wait, Duration::from_secs(30));

        advance(Duration::from_secs(10)).await;
        assert!(!bucket.status().can_make_request);

        advance(Duration::from_secs(20)).await;
        let status = bucket.status();
        assert!(status.can_make_request);
        assert_eq!(status.tokens, 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_budget_lifts_exhausted_window() {
        let bucket = TokenBucket::new(60, Some(15));
        bucket.update_from_headers(&headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "300"),
        ]));
        assert!(!bucket.status().can_make_request);

        advance(Duration::from_secs(5)).await;
        bucket.update_from_headers(&headers(&[
            ("x-ratelimit-remaining", "10"),
            ("x-ratelimit-reset", "295"),
        ]));
        let status = bucket.status();
        assert!(status.can_make_request);
        assert_eq!(status.tokens, 10.0);
        assert_eq!(status.next_token_in, Duration::ZERO);
        assert!(bucket.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_headers_leave_state_untouched() {
        let bucket = TokenBucket::new(60, Some(4));
        bucket.acquire().await;
        bucket.update_from_headers(&HeaderMap::new());
        assert_eq!(bucket.status().tokens, 3.0);
    }
}
