//! Exponential backoff for fallible async operations.
//!
//! The delay before retry `n` (counting from zero) is
//!
//! ```text
//! delay = min(base_delay * factor^n, max_delay) [+ jitter up to 10%, re-capped]
//! ```
//!
//! A caller-supplied predicate decides whether an error is worth retrying.
//! Once `1 + max_retries` attempts have failed, the last error is returned.

use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Create a doubling backoff.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Upper bound for any single delay
    /// * `jitter` - Add up to 10% random extra delay
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            factor: 2.0,
            jitter,
        }
    }

    /// Replace the growth factor. Factors below 1 are clamped to 1 so the
    /// schedule never shrinks.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = if factor.is_finite() { factor.max(1.0) } else { 2.0 };
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry `retry` (0-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let raw = base_ms * self.factor.powi(retry.min(i32::MAX as u32) as i32);
        Duration::from_millis(raw.min(max_ms) as u64)
    }

    /// The full retry schedule, without jitter.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|n| self.delay_for(n)).collect()
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let span = delay.as_millis() as u64 / 10;
        let extra = rng().random_range(0..=span);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }

    /// Run `op` until it succeeds, `should_retry` rejects its error, or the
    /// retry budget is spent.
    pub async fn execute<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        info!(attempt = retry + 1, "Request succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        debug!(error = %e, "Error not retryable");
                        return Err(e);
                    }
                    if retry >= self.max_retries {
                        error!(
                            attempt = retry + 1,
                            max_retries = self.max_retries,
                            error = %e,
                            "Max retries exceeded"
                        );
                        return Err(e);
                    }

                    let delay = self.jittered(self.delay_for(retry));
                    warn!(
                        attempt = retry + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed; backing off"
                    );
                    sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }

    /// [`ExponentialBackoff::execute`] with every error treated as retryable.
    pub async fn execute_all<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute(op, |_| true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tokio::time::Instant;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_try() {
        let backoff = ExponentialBackoff::new(3, ms(100), ms(1000), false);
        let calls = Cell::new(0);

        let result: Result<&str, String> = backoff
            .execute_all(|| {
                calls.set(calls.get() + 1);
                async { Ok("success") }
            })
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success_waits_100_200_400() {
        let backoff = ExponentialBackoff::new(3, ms(100), ms(1000), false);
        let started = RefCell::new(Vec::new());

        let result: Result<&str, String> = backoff
            .execute_all(|| {
                started.borrow_mut().push(Instant::now());
                let attempt = started.borrow().len();
                async move {
                    if attempt <= 3 {
                        Err(format!("failure {attempt}"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("success"));
        let started = started.into_inner();
        assert_eq!(started.len(), 4);
        let gaps: Vec<Duration> = started.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![ms(100), ms(200), ms(400)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let backoff = ExponentialBackoff::new(3, ms(100), ms(1000), false);
        let calls = Cell::new(0);

        let result: Result<(), String> = backoff
            .execute_all(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(format!("persistent failure {n}")) }
            })
            .await;

        assert_eq!(calls.get(), 4);
        assert_eq!(result, Err("persistent failure 4".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_short_circuits() {
        let backoff = ExponentialBackoff::new(3, ms(100), ms(1000), false);
        let calls = Cell::new(0);
        let started = Instant::now();

        let result: Result<(), String> = backoff
            .execute(
                || {
                    calls.set(calls.get() + 1);
                    async { Err("401 unauthorized".to_string()) }
                },
                |e| !e.starts_with("401"),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = ExponentialBackoff::new(5, ms(100), ms(300), false);
        assert_eq!(backoff.schedule(), vec![ms(100), ms(200), ms(300), ms(300), ms(300)]);
    }

    #[test]
    fn test_custom_factor() {
        let backoff = ExponentialBackoff::new(5, ms(1000), ms(30_000), false).with_factor(1.5);
        assert_eq!(backoff.delay_for(0), ms(1000));
        assert_eq!(backoff.delay_for(1), ms(1500));
        assert_eq!(backoff.delay_for(2), ms(2250));
    }

    #[test]
    fn test_schedule_is_non_decreasing_for_large_retry_counts() {
        let backoff = ExponentialBackoff::new(80, ms(250), ms(60_000), false);
        let schedule = backoff.schedule();
        assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*schedule.last().unwrap(), ms(60_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff::new(6, ms(100), ms(1000), true);
        for retry in 0..6 {
            let plain = backoff.delay_for(retry);
            for _ in 0..50 {
                let j = backoff.jittered(plain);
                assert!(j >= plain);
                assert!(j <= ms(1000));
                assert!(j <= plain + plain / 10);
            }
        }
    }
}
