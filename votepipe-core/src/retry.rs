//! Retry/backoff policy shared by every reconnect path.
//!
//! Reconnect loops never give up on their own; the only way out of a wait is
//! success or the caller's [`CancellationToken`].

use std::{fmt::Display, future::Future, time::Duration};

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Returned when a wait is interrupted by cancellation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Delay schedule for consecutive failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    base: Duration,
    max: Duration,
    multiplier: u32,
    /// Percentage-based jitter to spread out retries (0.0 disables).
    jitter_ratio: f64,
}

impl RetryPolicy {
    /// Same delay after every failure.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: delay,
            multiplier: 1,
            jitter_ratio: 0.0,
        }
    }

    /// Doubling delay starting at `base`, capped at `max`.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            multiplier: 2,
            jitter_ratio: 0.0,
        }
    }

    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Un-jittered delay for the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exp);
        self.base.saturating_mul(factor).min(self.max)
    }

    fn jittered(&self, anchor: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 || anchor.is_zero() {
            return anchor;
        }
        let anchor_ms = anchor.as_millis() as f64;
        let span = anchor_ms * self.jitter_ratio;
        let lower = (anchor_ms - span).max(0.0);
        let upper = (anchor_ms + span).min(self.max.as_millis() as f64);
        if upper <= lower {
            return anchor;
        }
        let picked = rand::rng().random_range(lower..=upper);
        Duration::from_millis(picked.round() as u64)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempts: 0,
        }
    }

    /// Run `op` until it succeeds, waiting out the schedule between
    /// failures.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut op: F,
        cancel: &CancellationToken,
    ) -> Result<T, Cancelled>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut backoff = self.backoff();
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(
                        error = %err,
                        attempt = backoff.attempts() + 1,
                        "attempt failed; retrying"
                    );
                    backoff.wait(cancel).await?;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

/// Failure counter driving a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let anchor = self.policy.delay_for(self.attempts);
        self.policy.jittered(anchor)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failure and sleep for the resulting delay.
    pub async fn wait(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Duration, Cancelled> {
        let delay = self.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_never_grows() {
        let mut backoff = RetryPolicy::fixed(Duration::from_secs(1)).backoff();
        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        }
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn exponential_policy_caps_at_max() {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_secs(1));
        assert_eq!(policy.delay_for(60), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_ratio_and_max() {
        let policy =
            RetryPolicy::exponential(Duration::from_secs(1), Duration::from_secs(4))
                .with_jitter(0.25);
        for _ in 0..100 {
            let mut backoff = policy.backoff();
            let first = backoff.next_delay();
            assert!(first >= Duration::from_millis(750));
            assert!(first <= Duration::from_millis(1250));
        }
        let mut capped = policy.backoff();
        for _ in 0..10 {
            assert!(capped.next_delay() <= Duration::from_secs(4));
        }
    }

    #[test]
    fn reset_restarts_schedule() {
        let policy = RetryPolicy::exponential(
            Duration::from_millis(10),
            Duration::from_secs(10),
        );
        let mut backoff = policy.backoff();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_cancelled_when_token_fires() {
        let cancel = CancellationToken::new();
        let mut backoff = RetryPolicy::fixed(Duration::from_secs(3600)).backoff();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        assert_eq!(backoff.wait(&cancel).await, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_runs_until_success() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::exponential(
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let mut calls = 0;
        let started = tokio::time::Instant::now();
        let value = policy
            .retry(
                || {
                    calls += 1;
                    let attempt = calls;
                    async move {
                        if attempt < 4 { Err("refused") } else { Ok(attempt) }
                    }
                },
                &cancel,
            )
            .await;
        assert_eq!(value, Ok(4));
        // 100ms + 200ms + 400ms between the four attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(700));
        assert!(elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let result: Result<(), Cancelled> = RetryPolicy::default()
            .retry(|| async { Err::<(), _>("down") }, &cancel)
            .await;
        assert_eq!(result, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_for_delay() {
        let cancel = CancellationToken::new();
        let mut backoff = RetryPolicy::fixed(Duration::from_secs(2)).backoff();
        let started = tokio::time::Instant::now();
        assert_eq!(backoff.wait(&cancel).await, Ok(Duration::from_secs(2)));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
