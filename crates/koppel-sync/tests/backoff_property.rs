//! Property tests for the backoff formula bounds.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use koppel_sync::BackoffPolicy;
use proptest::prelude::*;

proptest! {
    #[test]
    fn attempt_zero_returns_base_exactly(base_secs in 1u64..=120) {
        let policy = BackoffPolicy::default();
        prop_assert_eq!(
            policy.compute_timeout(Duration::from_secs(base_secs), 0),
            Duration::from_secs(base_secs)
        );
    }

    #[test]
    fn retry_waits_stay_in_the_jitter_band(base_secs in 1u64..=30, attempt in 1u32..=12) {
        let policy = BackoffPolicy::default();
        let exact = base_secs * 2u64.pow(attempt);
        let lower = ((exact as f64) * 1.1) as u64;
        let upper = ((exact as f64) * 1.3) as u64;

        let got = policy.compute_timeout(Duration::from_secs(base_secs), attempt).as_secs();
        prop_assert!(got >= lower.max(1), "wait {}s below band start {}s", got, lower);
        prop_assert!(got <= upper, "wait {}s above band end {}s", got, upper);
    }

    #[test]
    fn waits_never_deflate_below_one_second(attempt in 1u32..=3) {
        let policy = BackoffPolicy::default();
        let got = policy.compute_timeout(Duration::from_millis(50), attempt);
        prop_assert!(got >= Duration::from_secs(1));
    }
}
