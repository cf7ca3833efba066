//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] randomizes a computed backoff so that thousands of clusters
//! (or events) that failed together do not hit the provider API together again.
//!
//! - [`JitterPolicy::None`] exact delay
//! - [`JitterPolicy::Full`] random delay in [0, delay]
//! - [`JitterPolicy::Equal`] delay/2 + random[0, delay/2]

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Policy controlling randomization of retry delays.
///
/// Jitter is applied **after** clamping to the policy maximum, so it can only
/// shorten a delay and never breaks the `max` bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,
    /// Random delay in [0, delay].
    Full,
    /// delay/2 + random[0, delay/2]; keeps roughly 75% of the backoff on average.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
        }
    }
}

fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let jitter = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}
