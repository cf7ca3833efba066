//! # LogWriter: renders runtime events through `tracing`.
//!
//! ## Example output (compact formatter)
//! ```text
//! INFO  loop starting loop="watcher"
//! INFO  cluster published cluster="shoot--proj--c1" provider="azure"
//! WARN  collection failed cluster="shoot--proj--c1" delay_ms=60000 reason="throttled by provider: ..."
//! WARN  cluster evicted cluster="shoot--proj--c1" attempt=6 reason="resource not found: ..."
//! ERROR delivery dropped event=42 reason="ingestion endpoint returned unexpected status 500"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{RuntimeEvent, RuntimeEventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &RuntimeEvent) {
        let name = e.name.as_deref().unwrap_or("");
        let cluster = e.cluster.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            RuntimeEventKind::LoopStarting => info!(loop_name = name, "loop starting"),
            RuntimeEventKind::LoopStopped => info!(loop_name = name, "loop stopped"),
            RuntimeEventKind::LoopFailed => error!(loop_name = name, reason, "loop failed"),
            RuntimeEventKind::ShutdownRequested => info!(loop_name = name, "shutdown requested"),
            RuntimeEventKind::AllStoppedWithin => info!("all loops stopped within grace"),
            RuntimeEventKind::GraceExceeded => error!(stuck = reason, "grace exceeded"),

            RuntimeEventKind::ClusterPublished => debug!(
                cluster,
                provider = e.provider.as_deref().unwrap_or(""),
                reason,
                "cluster published"
            ),
            RuntimeEventKind::ClusterSkipped => warn!(cluster, reason, "cluster skipped"),

            RuntimeEventKind::ClusterRemoved => info!(
                cluster,
                provider = e.provider.as_deref().unwrap_or(""),
                "cluster removed"
            ),
            RuntimeEventKind::ClusterDropped => warn!(cluster, reason, "cluster dropped"),
            RuntimeEventKind::ClusterEvicted => {
                warn!(cluster, attempt = e.attempt, reason, "cluster evicted")
            }
            RuntimeEventKind::CollectFailed => {
                warn!(cluster, delay_ms = e.delay_ms, reason, "collection failed")
            }
            RuntimeEventKind::EventEmitted => debug!(cluster, "metrics emitted"),
            RuntimeEventKind::FallbackEmitted => info!(cluster, "last known metrics re-emitted"),

            RuntimeEventKind::DeliverySucceeded => debug!(
                event = e.event,
                tenant = e.tenant.as_deref().unwrap_or(""),
                "event delivered"
            ),
            RuntimeEventKind::DeliveryRetryScheduled => warn!(
                event = e.event,
                attempt = e.attempt,
                delay_ms = e.delay_ms,
                reason,
                "delivery retry scheduled"
            ),
            RuntimeEventKind::DeliveryDropped => {
                error!(event = e.event, reason, "delivery dropped")
            }

            RuntimeEventKind::SubscriberOverflow => {
                warn!(subscriber = name, reason, "subscriber overflow")
            }
            RuntimeEventKind::SubscriberPanicked => {
                error!(subscriber = name, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
