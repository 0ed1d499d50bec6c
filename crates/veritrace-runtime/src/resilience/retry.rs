//! Retry policy for rate-limited backend calls.
//!
//! The delay before retry `n` (0-indexed) is
//! `base_delay * 2^n + uniform(0, max_jitter)`. Only failures classified as
//! throttling are retried; the policy plugs into `backon` as a
//! [`BackoffBuilder`].

use backon::BackoffBuilder;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first call included
    pub max_attempts: u32,

    #[serde(with = "crate::config::humantime_serde")]
    pub base_delay: Duration,

    #[serde(with = "crate::config::humantime_serde")]
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_jitter: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_jitter,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Lower (inclusive) and upper (exclusive) bound of the delay before retry `n`.
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let floor = self.base_delay.saturating_mul(1u32 << attempt.min(31));
        (floor, floor.saturating_add(self.max_jitter))
    }

    /// Delay before retry `n`, with jitter drawn from `rng`.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let (floor, _) = self.delay_bounds(attempt);
        let jitter_nanos = self.max_jitter.as_nanos().min(u64::MAX as u128) as u64;
        let jitter = if jitter_nanos == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(rng.gen_range(0..jitter_nanos))
        };
        floor.saturating_add(jitter)
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = RateLimitBackoff;

    fn build(self) -> Self::Backoff {
        RateLimitBackoff {
            policy: self,
            attempt: 0,
        }
    }
}

/// Delay sequence produced by [`RetryPolicy`]; yields `max_attempts - 1` delays.
#[derive(Debug, Clone)]
pub struct RateLimitBackoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Iterator for RateLimitBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.policy.max_attempts {
            return None;
        }
        let delay = self.policy.delay_for(self.attempt, &mut rand::thread_rng());
        self.attempt += 1;
        Some(delay)
    }
}
