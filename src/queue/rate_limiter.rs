//! # Per-key exponential failure rate limiter.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;

use crate::policies::BackoffPolicy;

/// Tracks failures per key and converts them into retry delays.
///
/// `when(k)` returns `backoff.next(failures(k))` and then increments the
/// counter; `forget(k)` resets it so the next failure starts from the base delay.
#[derive(Debug)]
pub struct RateLimiter<K> {
    backoff: BackoffPolicy,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Creates a limiter driven by `backoff`.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the delay for the next retry of `key` and records one more failure.
    pub fn when(&self, key: &K) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.next(*count);
        *count = count.saturating_add(1);
        delay
    }

    /// Clears the failure history of `key`.
    pub fn forget(&self, key: &K) {
        self.failures.lock().remove(key);
    }

    /// Number of failures recorded for `key` since the last `forget`.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }

    /// The backoff policy used by this limiter.
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter<String> {
        RateLimiter::new(BackoffPolicy::exponential(
            Duration::from_secs(1),
            Duration::from_secs(60),
        ))
    }

    #[test]
    fn delays_grow_until_capped() {
        let rl = limiter();
        let key = "c1".to_string();
        let delays: Vec<Duration> = (0..10).map(|_| rl.when(&key)).collect();

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[5], Duration::from_secs(32));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(60)));
        assert_eq!(rl.num_requeues(&key), 10);
    }

    #[test]
    fn forget_resets_to_base_delay() {
        let rl = limiter();
        let key = "c1".to_string();
        for _ in 0..4 {
            rl.when(&key);
        }
        rl.forget(&key);
        assert_eq!(rl.num_requeues(&key), 0);
        assert_eq!(rl.when(&key), Duration::from_secs(1));
    }

    #[test]
    fn keys_are_independent() {
        let rl = limiter();
        let (a, b) = ("a".to_string(), "b".to_string());
        rl.when(&a);
        rl.when(&a);
        assert_eq!(rl.when(&b), Duration::from_secs(1));
        assert_eq!(rl.num_requeues(&a), 2);
    }
}
