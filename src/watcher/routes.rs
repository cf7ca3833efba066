use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::cluster::Cluster;

/// Outbound cluster channels, one per provider engine.
#[derive(Clone, Debug, Default)]
pub struct ClusterRoutes {
    routes: HashMap<String, mpsc::Sender<Cluster>>,
}

impl ClusterRoutes {
    /// Creates an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes clusters of `provider` to `tx`, replacing any previous route.
    pub fn with_route(mut self, provider: impl Into<String>, tx: mpsc::Sender<Cluster>) -> Self {
        self.routes.insert(provider.into(), tx);
        self
    }

    /// Channel for `provider`, if an engine is registered for it.
    pub fn get(&self, provider: &str) -> Option<&mpsc::Sender<Cluster>> {
        self.routes.get(provider)
    }

    /// True if an engine is registered for `provider`.
    pub fn contains(&self, provider: &str) -> bool {
        self.routes.contains_key(provider)
    }

    /// Every registered provider with its channel.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &mpsc::Sender<Cluster>)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
