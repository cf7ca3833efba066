//! Runtime events: types and broadcast bus.
//!
//! Every stage reports what it does by publishing a [`RuntimeEvent`] on the
//! shared [`Bus`]; nothing in the pipeline prints or logs directly on the
//! lifecycle path. Subscribers (see [`crate::subscribers`]) turn events into
//! logs, metrics or test assertions.
//!
//! ## Contents
//! - [`RuntimeEventKind`], [`RuntimeEvent`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor`, `FleetWatcher`, `PollingEngine`, `DeliveryClient`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's subscriber listener (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{RuntimeEvent, RuntimeEventKind};
