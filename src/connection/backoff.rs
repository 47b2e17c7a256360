//! Reconnect backoff.
//!
//! `delay(attempt) = min(initial * 2^attempt, max) + jitter`, with jitter
//! uniform in `[0, max_jitter)`.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectPolicy;

/// Backoff calculator for one reconnect policy.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    /// Check if another attempt is allowed after `attempts` failures.
    pub fn can_retry(&self, attempts: u32) -> bool {
        attempts < self.policy.max_attempts
    }

    /// Capped exponential delay in milliseconds, without jitter.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        self.policy
            .initial_delay_ms
            .saturating_mul(1u64 << attempt.min(31))
            .min(self.policy.max_delay_ms)
    }

    /// Delay with an explicit jitter in milliseconds (clamped below `max_jitter`).
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let jitter = jitter_ms.min(self.policy.max_jitter_ms.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms(attempt).saturating_add(jitter))
    }

    /// Delay with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.policy.max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..self.policy.max_jitter_ms)
        };
        self.delay_with_jitter(attempt, jitter)
    }
}
