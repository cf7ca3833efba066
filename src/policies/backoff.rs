//! # Exponential backoff for retry queues.
//!
//! The delay scheduled for a key that has already failed `n` times is
//! `first × factor^n`, clamped to `max`, then jittered. Because the base delay
//! is derived purely from the failure count, jitter output never feeds back into
//! the next calculation.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use fleetmeter::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::exponential(Duration::from_secs(30), Duration::from_secs(600));
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(30));
//! assert_eq!(backoff.next(1), Duration::from_secs(60));
//! // 30s × 2^6 = 1920s → capped
//! assert_eq!(backoff.next(6), Duration::from_secs(600));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay scheduled after the first failure (failure count 0).
    pub first: Duration,
    /// Upper bound for any scheduled delay.
    pub max: Duration,
    /// Multiplicative growth factor (`2.0` doubles the delay per failure).
    pub factor: f64,
    /// Jitter applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Per-item exponential failure limiter defaults: 5ms doubling up to 1000s.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Doubling backoff from `first` up to `max`, without jitter.
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns the same policy with a different jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay for a key that already failed `failures` times.
    ///
    /// Overflowing or non-finite intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, failures: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling() -> BackoffPolicy {
        BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
    }

    #[test]
    fn zero_failures_returns_first() {
        assert_eq!(doubling().next(0), Duration::from_millis(100));
    }

    #[test]
    fn doubles_per_failure() {
        let policy = doubling();
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(3), Duration::from_millis(800));
    }

    #[test]
    fn never_decreases_and_never_exceeds_max() {
        let policy = doubling();
        let mut prev = Duration::ZERO;
        for n in 0..64 {
            let d = policy.next(n);
            assert!(d >= prev, "failure {n}: {d:?} < {prev:?}");
            assert!(d <= policy.max);
            prev = d;
        }
    }

    #[test]
    fn first_above_max_is_clamped() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn overflow_clamps_to_max() {
        assert_eq!(doubling().next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_respects_max() {
        let policy = doubling().with_jitter(JitterPolicy::Equal);
        for n in 0..20 {
            assert!(policy.next(n) <= Duration::from_secs(30));
        }
    }
}
