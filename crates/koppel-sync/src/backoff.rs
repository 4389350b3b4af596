//! Exponential backoff with escalating per-attempt timeouts.
//!
//! Retrying with the timeout that just failed tends to fail again, so the
//! budget doubles on every attempt and picks up a random jitter factor to
//! spread load when many runs retry at once. The same schedule doubles as
//! the wait time between attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Highest exponent used for the doubling multiplier.
///
/// Attempt numbers beyond this keep the same multiplier instead of
/// overflowing the intermediate arithmetic.
const MAX_EXPONENT: u32 = 20;

/// Backoff policy controlling timeout escalation across attempts.
///
/// Attempt numbering is zero-based. Attempt 0 runs with the base timeout
/// unchanged so a healthy request costs nothing extra. Every later attempt
/// gets `base * 2^attempt`, widened by a jitter factor drawn uniformly from
/// `[jitter_min, jitter_max)` on each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Lower jitter bound, inclusive.
    pub jitter_min: f64,
    /// Upper jitter bound, exclusive.
    pub jitter_max: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { jitter_min: 0.10, jitter_max: 0.30 }
    }
}

impl BackoffPolicy {
    /// Computes the timeout budget for a given attempt.
    ///
    /// The jittered product is truncated to whole seconds and never drops
    /// below one second, so sub-second bases still yield a usable budget
    /// once escalation starts. Attempt 0 returns `base` exactly, with no
    /// jitter and no rounding.
    pub fn compute_timeout(&self, base: Duration, attempt: u32) -> Duration {
        if attempt == 0 {
            return base;
        }

        let exponent = attempt.min(MAX_EXPONENT);
        let multiplier = f64::from(2_u32.saturating_pow(exponent));
        let scaled = base.as_secs_f64() * multiplier * (1.0 + self.sample_jitter());

        // Truncation, not rounding: 2.9 scaled seconds is a 2s budget.
        let whole_seconds = scaled as u64;
        Duration::from_secs(whole_seconds.max(1))
    }

    /// Draws one jitter factor from the configured half-open range.
    fn sample_jitter(&self) -> f64 {
        if self.jitter_min >= self.jitter_max {
            return self.jitter_min.max(0.0);
        }

        let mut rng = rand::rng();
        rng.random_range(self.jitter_min..self.jitter_max)
    }
}
