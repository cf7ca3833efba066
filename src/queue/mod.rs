//! Rate-limited retry queue.
//!
//! The delaying work queue shared by the polling engine (keyed by technical id)
//! and the delivery client (keyed by event identity).
//!
//! ## Contents
//! - [`RateLimitedQueue`] dedup + exclusive checkout + delayed re-admission
//! - [`RateLimiter`] per-key failure counter turning failures into delays
//!
//! ## Item lifecycle
//! ```text
//!            add(k)                      get() → k                done(k)
//!   idle ───────────► queued ──────────────────► processing ───────────► idle
//!     ▲                 ▲                          │ add(k) while here:
//!     │                 └──────── dirty ◄──────────┘ re-queued on done(k)
//!     │
//!     └── add_rate_limited(k): sleep(limiter.when(k)) then add(k)
//! ```
//!
//! ## Rules
//! - At most one outstanding occurrence of a key (queued or dirty).
//! - At most one worker holds a key between `get` and `done`.
//! - `shut_down` stops admission; `get` drains what is queued, then returns `None`.

mod delaying;
mod rate_limiter;

pub use delaying::RateLimitedQueue;
pub use rate_limiter::RateLimiter;
