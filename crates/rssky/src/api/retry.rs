//! Bounded retry with an injectable sleep.
//!
//! Both pipelines run at most [`RetryPolicy::max_attempts`] attempts and
//! pause between them according to [`Backoff`]. The pause goes through a
//! [`Sleeper`] so tests can run the full retry schedule without waiting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// How the pause grows between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// The same pause before every retry.
    Fixed,
    /// `delay * multiplier^(retry - 1)`, capped at `max_delay`.
    Exponential { multiplier: f64, max_delay: Duration },
}

/// Attempt budget and pause schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Base pause before each retry.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Fixed pause between a bounded number of attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Per-item summarization: three attempts back to back.
    pub fn per_item() -> Self {
        Self::fixed(3, Duration::ZERO)
    }

    /// Digest aggregation: three attempts, three seconds apart.
    pub fn digest() -> Self {
        Self::fixed(3, Duration::from_secs(3))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Effective number of attempts (never zero).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause before the 1-based `attempt`. The first attempt never waits,
    /// and nothing is scheduled after the last one.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || attempt > self.attempts() {
            return Duration::ZERO;
        }
        match &self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential {
                multiplier,
                max_delay,
            } => {
                let retry = (attempt - 2) as i32;
                let base = self.delay.as_secs_f64() * multiplier.powi(retry);
                Duration::from_secs_f64(base.min(max_delay.as_secs_f64()).max(0.0))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::per_item()
    }
}

// ── Sleeping ───────────────────────────────────────────────────────

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source of in-process delays between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Real sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(async move {
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
        })
    }
}

/// Returns immediately and remembers every requested pause.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested pauses, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_budgets() {
        let item = RetryPolicy::per_item();
        assert_eq!(item.attempts(), 3);
        assert_eq!(item.delay_before(2), Duration::ZERO);

        let digest = RetryPolicy::digest();
        assert_eq!(digest.attempts(), 3);
        assert_eq!(digest.delay_before(2), Duration::from_secs(3));
        assert_eq!(digest.delay_before(3), Duration::from_secs(3));
    }

    #[test]
    fn first_attempt_and_beyond_budget_never_wait() {
        let policy = RetryPolicy::digest();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(4), Duration::ZERO);
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy::per_item().with_max_attempts(0);
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            delay: Duration::from_secs(1),
            backoff: Backoff::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_secs(5),
            },
        };
        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before(4), Duration::from_secs(4));
        assert_eq!(policy.delay_before(5), Duration::from_secs(5));
        assert_eq!(policy.delay_before(6), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn recording_sleeper_does_not_wait() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(3600)).await;
        sleeper.sleep(Duration::from_secs(1)).await;
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_secs(3600), Duration::from_secs(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_uses_the_timer() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(3)).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
