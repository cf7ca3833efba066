//! # Runtime events emitted by the supervisor and the pipeline stages.
//!
//! [`RuntimeEventKind`] classifies events in four groups:
//! - **Supervisor**: loop lifecycle and shutdown
//! - **Watcher**: cluster changes published or skipped
//! - **Polling**: per-cluster collection outcomes
//! - **Delivery**: per-event ingestion outcomes
//!
//! [`RuntimeEvent`] carries the optional metadata (loop name, cluster id,
//! attempt, delay, reason) relevant to its kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fleetmeter::{RuntimeEvent, RuntimeEventKind};
//!
//! let ev = RuntimeEvent::new(RuntimeEventKind::ClusterEvicted)
//!     .with_cluster("shoot--proj--c1")
//!     .with_attempt(5)
//!     .with_reason("resource group not found");
//!
//! assert_eq!(ev.kind, RuntimeEventKind::ClusterEvicted);
//! assert_eq!(ev.cluster.as_deref(), Some("shoot--proj--c1"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEventKind {
    // === Subscriber events ===
    /// Subscriber panicked while handling an event. Sets `name`, `reason`.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed). Sets `name`, `reason`.
    SubscriberOverflow,

    // === Supervisor events ===
    /// A loop was spawned. Sets `name`.
    LoopStarting,
    /// A loop returned `Ok` or observed cancellation. Sets `name`.
    LoopStopped,
    /// A loop returned an error or panicked. Sets `name`, `reason`.
    LoopFailed,
    /// The first loop finished (or an OS signal arrived); all others are being cancelled.
    ShutdownRequested,
    /// All loops observed the stop signal within the grace period.
    AllStoppedWithin,
    /// Grace period exceeded; the remaining loops were aborted. Sets `reason` (stuck loops).
    GraceExceeded,

    // === Watcher events ===
    /// A cluster addition/update/removal was pushed downstream. Sets `cluster`, `provider`.
    ClusterPublished,
    /// A resource could not be reconciled and was skipped. Sets `cluster`, `reason`.
    ClusterSkipped,

    // === Polling events ===
    /// A deleted cluster was removed from the engine's store. Sets `cluster`, `provider`.
    ClusterRemoved,
    /// A cluster's credentials were unusable; it was dropped. Sets `cluster`, `reason`.
    ClusterDropped,
    /// A cluster kept reporting "not found" and was evicted. Sets `cluster`, `attempt`, `reason`.
    ClusterEvicted,
    /// A collection attempt failed; it was rescheduled. Sets `cluster`, `delay_ms`, `reason`.
    CollectFailed,
    /// Fresh metrics were emitted. Sets `cluster`.
    EventEmitted,
    /// The last known metrics were re-emitted after a failure. Sets `cluster`.
    FallbackEmitted,

    // === Delivery events ===
    /// The ingestion endpoint accepted an event. Sets `event`, `tenant`.
    DeliverySucceeded,
    /// Delivery failed and a retry was scheduled. Sets `event`, `attempt`, `delay_ms`, `reason`.
    DeliveryRetryScheduled,
    /// Delivery was abandoned (terminal error or retries exhausted). Sets `event`, `reason`.
    DeliveryDropped,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct RuntimeEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: RuntimeEventKind,

    /// Loop or subscriber name.
    pub name: Option<Arc<str>>,
    /// Cluster technical id.
    pub cluster: Option<Arc<str>>,
    /// Provider type.
    pub provider: Option<Arc<str>>,
    /// Delivery envelope id.
    pub event: Option<u64>,
    /// Tenant key of a delivered event.
    pub tenant: Option<Arc<str>>,
    /// Attempt / retry counter.
    pub attempt: Option<u32>,
    /// Scheduled delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl RuntimeEvent {
    /// Creates an event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: RuntimeEventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            name: None,
            cluster: None,
            provider: None,
            event: None,
            tenant: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a loop or subscriber name.
    #[inline]
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches a cluster technical id.
    #[inline]
    pub fn with_cluster(mut self, cluster: impl Into<Arc<str>>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Attaches a provider type.
    #[inline]
    pub fn with_provider(mut self, provider: impl Into<Arc<str>>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attaches a delivery envelope id.
    #[inline]
    pub fn with_event(mut self, id: u64) -> Self {
        self.event = Some(id);
        self
    }

    /// Attaches a tenant key.
    #[inline]
    pub fn with_tenant(mut self, tenant: impl Into<Arc<str>>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        RuntimeEvent::new(RuntimeEventKind::SubscriberOverflow)
            .with_name(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        RuntimeEvent::new(RuntimeEventKind::SubscriberPanicked)
            .with_name(subscriber)
            .with_reason(info)
    }
}
