//! # Runtime event subscribers.
//!
//! [`Subscribe`] is the extension point for reacting to [`RuntimeEvent`](crate::RuntimeEvent)s
//! (logging, metrics, alerting); [`SubscriberSet`] fans events out to them.
//!
//! ## Architecture
//! ```text
//! Stage ── publish(RuntimeEvent) ──► Bus ──► supervisor listener ──► SubscriberSet::emit
//!                                                                   ┌──────┼──────┐
//!                                                                   ▼      ▼      ▼
//!                                                              LogWriter Metrics Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use fleetmeter::{RuntimeEvent, RuntimeEventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct EvictionCounter;
//!
//! #[async_trait]
//! impl Subscribe for EvictionCounter {
//!     async fn on_event(&self, event: &RuntimeEvent) {
//!         if event.kind == RuntimeEventKind::ClusterEvicted {
//!             // increment a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "eviction-counter" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
