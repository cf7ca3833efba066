use std::fmt;
use std::sync::Arc;

use crate::cluster::Cluster;
use crate::provider::{ClusterMetadata, EventData, ManagementApi};

/// Per-cluster polling state, stored under the cluster's technical id.
///
/// Only the worker holding the key in the engine's queue mutates it; intake
/// refreshes `cluster` and `client` through atomic store updates.
#[derive(Clone)]
pub struct Instance {
    /// Latest cluster value received from the watcher.
    pub cluster: Cluster,
    /// Management API handle built from the cluster's credentials.
    pub client: Arc<dyn ManagementApi>,
    /// One-time metadata; `None` until resolved.
    pub metadata: Option<ClusterMetadata>,
    /// Last successful collection, re-emitted when a poll fails.
    pub last_event: Option<EventData>,
    /// Consecutive "not found" answers.
    pub retry_attempts: u32,
}

impl Instance {
    /// Fresh state for a newly seen cluster.
    pub fn new(cluster: Cluster, client: Arc<dyn ManagementApi>) -> Self {
        Self {
            cluster,
            client,
            metadata: None,
            last_event: None,
            retry_attempts: 0,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("cluster", &self.cluster)
            .field("metadata", &self.metadata)
            .field("has_last_event", &self.last_event.is_some())
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}
