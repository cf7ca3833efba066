//! Retry delay policies.
//!
//! Both retry queues (per-cluster polling and per-event delivery) compute their
//! delays from the same two knobs:
//!
//! - [`BackoffPolicy`] how delays evolve with the failure count (base / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries across keys
//!
//! ## Quick wiring
//! ```text
//! RateLimitedQueue::add_rate_limited(key)
//!      └─► RateLimiter::when(key)
//!           ├─ failures = failures(key); failures(key) += 1
//!           └─ backoff.next(failures)   = min(max, first × factor^failures) ± jitter
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=5ms, factor=2.0, max=1000s, jitter=None.
//! - `JitterPolicy::None` by default; delivery may opt into `Equal`.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
