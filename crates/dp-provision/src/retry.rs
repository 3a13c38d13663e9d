//! Backoff scheduling for polling loops and transient-failure retries.
//!
//! The scheduler answers two questions: how long to wait before the next
//! attempt, and whether the retry budget is spent. Polling loops (e.g.
//! long-running-operation tracking) drive it directly; convenience
//! wrapper [`retry_with_backoff`] serves call sites that retry a whole
//! async operation. All waits are `tokio::time::sleep`, so dropping the
//! future cancels the loop instead of swallowing cancellation.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::warn;

/// How delays grow between attempts and how much total time may be spent.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the next attempt.
    pub interval: Duration,
    /// Growth factor per attempt; 1.0 keeps the interval fixed.
    pub multiplier: f64,
    /// Cap on a single delay.
    pub max_interval: Duration,
    /// Random addition to the budget, up to this much, so many concurrent
    /// loops do not expire in lockstep.
    pub jitter: Duration,
    /// Total elapsed time allowed across all waits; `None` is unbounded.
    pub budget: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed-interval polling policy.
    pub fn fixed(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            multiplier: 1.0,
            max_interval: interval,
            jitter: Duration::ZERO,
            budget: None,
        }
    }

    /// Exponential backoff starting at `initial`, doubling up to 30s.
    pub fn exponential(initial: Duration) -> Self {
        RetryPolicy {
            interval: initial,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            jitter: Duration::ZERO,
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Tracks one retry loop's position against its policy.
pub struct RetryScheduler {
    next_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    deadline: Option<Instant>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        let deadline = policy.budget.map(|budget| {
            let jitter = if policy.jitter.is_zero() {
                Duration::ZERO
            } else {
                rand::thread_rng().gen_range(Duration::ZERO..policy.jitter)
            };
            Instant::now() + budget + jitter
        });
        RetryScheduler {
            next_interval: policy.interval,
            multiplier: policy.multiplier,
            max_interval: policy.max_interval,
            deadline,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the budget
    /// is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return None;
        }
        let delay = self.next_interval;
        let grown = self.next_interval.as_secs_f64() * self.multiplier;
        self.next_interval = Duration::from_secs_f64(grown.min(self.max_interval.as_secs_f64()));
        Some(delay)
    }
}

/// Run an async operation, retrying on failure per the policy. Returns
/// the last error once the budget is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut scheduler = RetryScheduler::new(policy);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let Some(delay) = scheduler.next_delay() else {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %e,
                        "retry budget exhausted"
                    );
                    return Err(e);
                };
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_yields_constant_delays() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::fixed(Duration::from_secs(2)));
        for _ in 0..5 {
            assert_eq!(scheduler.next_delay(), Some(Duration::from_secs(2)));
        }
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let mut policy = RetryPolicy::exponential(Duration::from_secs(4));
        policy.max_interval = Duration::from_secs(10);
        let mut scheduler = RetryScheduler::new(policy);
        assert_eq!(scheduler.next_delay(), Some(Duration::from_secs(4)));
        assert_eq!(scheduler.next_delay(), Some(Duration::from_secs(8)));
        assert_eq!(scheduler.next_delay(), Some(Duration::from_secs(10)));
        assert_eq!(scheduler.next_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let mut scheduler = RetryScheduler::new(
            RetryPolicy::fixed(Duration::from_secs(2)).with_budget(Duration::ZERO),
        );
        assert_eq!(scheduler.next_delay(), None);
    }

    #[test]
    fn unbounded_policy_never_exhausts() {
        let mut scheduler = RetryScheduler::new(RetryPolicy::fixed(Duration::from_millis(1)));
        for _ in 0..1000 {
            assert!(scheduler.next_delay().is_some());
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let mut remaining_failures = 2;
        let result: std::result::Result<u32, &str> = retry_with_backoff(
            RetryPolicy::fixed(Duration::from_millis(1)),
            "op",
            || {
                let fail = remaining_failures > 0;
                if fail {
                    remaining_failures -= 1;
                }
                async move { if fail { Err("transient") } else { Ok(7) } }
            },
        )
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn returns_last_error_when_budget_spent() {
        let result: std::result::Result<u32, &str> = retry_with_backoff(
            RetryPolicy::fixed(Duration::from_millis(1)).with_budget(Duration::ZERO),
            "op",
            || async { Err("always") },
        )
        .await;
        assert_eq!(result, Err("always"));
    }
}
