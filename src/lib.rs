//! # fleetmeter
//!
//! **Fleetmeter** meters the resource usage of a dynamically changing fleet
//! of clusters and forwards one usage event per cluster and poll to an
//! external ingestion endpoint.
//!
//! The crate is a three-stage concurrent pipeline glued together by bounded
//! channels, each stage running as one loop under a fail-fast [`Supervisor`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   control-plane feed (Notification)
//!              │
//!              ▼
//! ┌────────────────────────┐      per provider       ┌──────────────────────────────┐
//! │      FleetWatcher      │ ─── mpsc<Cluster> ────► │  PollingEngine (one/provider)│
//! │ descriptors + secrets  │                         │  KeyedStore<Instance>        │
//! │ → Cluster, owner check │                         │  RateLimitedQueue<tech id>   │
//! └────────────────────────┘                         │  W workers → MetricsProvider │
//!                                                    └──────────────┬───────────────┘
//!                                                                   │ mpsc<Event>
//!                                                                   ▼
//!                                                    ┌──────────────────────────────┐
//!                                                    │       DeliveryClient         │
//!                                                    │  RateLimitedQueue<Event>     │
//!                                                    │  W workers → IngestionSink   │
//!                                                    └──────────────────────────────┘
//!
//!   every stage ──► Bus (RuntimeEvent) ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Lifecycle
//! ```text
//! Supervisor::run(loops)
//!   ├─► spawn every loop with a child stop token
//!   ├─► first loop returns (Ok, Err, panic, OS signal)
//!   │      └─► publish LoopStopped | LoopFailed, ShutdownRequested
//!   ├─► cancel the stop token
//!   └─► wait up to `grace` for the rest
//!          ├─ all stopped ──► AllStoppedWithin
//!          └─ timeout     ──► abort, GraceExceeded
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Primitives**    | Concurrent keyed state and a rate-limited retry queue.        | [`KeyedStore`], [`RateLimitedQueue`]        |
//! | **Policies**      | Exponential backoff with optional jitter.                     | [`BackoffPolicy`], [`JitterPolicy`]         |
//! | **Supervision**   | Run loops, unwind all of them when one returns.               | [`Supervisor`], [`Loop`], [`LoopFn`]        |
//! | **Stages**        | Watcher, polling engines, delivery client.                    | [`watcher`], [`engine`], [`delivery`]       |
//! | **Providers**     | Pluggable metric collection per infrastructure provider.      | [`provider::MetricsProvider`]               |
//! | **Subscriber API**| Hook into runtime events (logging, custom subscribers).       | [`Subscribe`]                               |
//! | **Errors**        | Typed errors for every stage.                                 | [`RuntimeError`], [`ProviderError`], ...    |
//! | **Configuration** | One structured config, YAML-loadable.                         | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging` _(default)_: the [`LogWriter`] subscriber and `logging::init`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetmeter::{Config, Pipeline};
//! use fleetmeter::provider::ProviderRegistry;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::from_yaml_str(&std::fs::read_to_string("fleetmeter.yaml")?)?;
//!
//!     #[cfg(feature = "logging")]
//!     fleetmeter::logging::init(&cfg.logging)?;
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn fleetmeter::Subscribe>> = vec![Arc::new(fleetmeter::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn fleetmeter::Subscribe>> = Vec::new();
//!
//!     // Register providers backed by real management API connectors here.
//!     let providers = ProviderRegistry::new();
//!
//!     // Fed by the control-plane watch client.
//!     let (_feed_tx, feed) = mpsc::channel(128);
//!
//!     Pipeline::with_http_sink(cfg, providers)?
//!         .with_subscribers(subs)
//!         .run(feed)
//!         .await?;
//!     Ok(())
//! }
//! ```

mod cluster;
mod core;
mod error;
mod events;
mod loops;
mod pipeline;
mod policies;
mod queue;
mod store;
mod subscribers;

pub mod config;
pub mod delivery;
pub mod engine;
pub mod provider;
pub mod watcher;

#[cfg(feature = "logging")]
pub mod logging;

// ---- Public re-exports ----

pub use cluster::{Cluster, CredentialData};
pub use config::Config;
pub use core::{Supervisor, SupervisorBuilder, signal_loop, wait_for_shutdown_signal};
pub use error::{
    ConfigError, DeliveryError, ErrorClass, LoopError, ProviderError, RuntimeError, WatchError,
};
pub use events::{Bus, RuntimeEvent, RuntimeEventKind};
pub use loops::{BoxLoopFuture, Loop, LoopFn, LoopRef};
pub use pipeline::Pipeline;
pub use policies::{BackoffPolicy, JitterPolicy};
pub use queue::{RateLimitedQueue, RateLimiter};
pub use store::KeyedStore;
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in subscriber rendering runtime events through `tracing`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
