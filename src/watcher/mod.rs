//! # Fleet-change watcher.
//!
//! Turns control-plane notifications about cluster descriptors and their
//! credential secrets into [`Cluster`] values and routes them to the polling
//! engine of the cluster's provider.
//!
//! ```text
//! feed ──► FleetWatcher::handle ──► build(descriptor, secret)
//!                                      │  labels, secret, technical id, owner check
//!                                      ▼
//!                          ClusterRoutes[provider].send(cluster)    (awaits: backpressure)
//!                          deletions → every route
//! ```
//!
//! Per-resource failures ([`WatchError`]) are published as `ClusterSkipped` and
//! never stop the loop. The loop itself fails only when the feed closes.

mod resources;
mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use resources::{ClusterDescriptor, Notification, ObjectKey, Secret, Tombstone};
pub use routes::ClusterRoutes;

use crate::cluster::Cluster;
use crate::error::{LoopError, WatchError};
use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};
use crate::loops::{BoxLoopFuture, Loop, LoopRef};
use crate::store::KeyedStore;

/// Label carrying the global account id.
pub const ACCOUNT_ID_LABEL: &str = "metering.fleet.io/global-account-id";
/// Label carrying the subaccount id.
pub const SUBACCOUNT_ID_LABEL: &str = "metering.fleet.io/subaccount-id";
/// Descriptor purpose marking a trial cluster.
pub const TRIAL_PURPOSE: &str = "evaluation";

const PROJECT_NAMESPACE_PREFIX: &str = "garden-";

/// Derives the fleet-wide technical id of a descriptor from its key.
///
/// ```
/// use fleetmeter::watcher::technical_id;
///
/// assert_eq!(technical_id("garden-acme", "c1"), "shoot--acme--c1");
/// assert_eq!(technical_id("acme", "c1"), "shoot--acme--c1");
/// ```
pub fn technical_id(namespace: &str, name: &str) -> String {
    let project = namespace
        .strip_prefix(PROJECT_NAMESPACE_PREFIX)
        .unwrap_or(namespace);
    format!("shoot--{project}--{name}")
}

/// Reconciles control-plane resources into cluster changes.
pub struct FleetWatcher {
    routes: ClusterRoutes,
    bus: Bus,
    descriptors: KeyedStore<ClusterDescriptor>,
    secrets: KeyedStore<Secret>,
    /// technical id → `namespace/name` of the descriptor that claimed it.
    owners: Mutex<HashMap<String, String>>,
}

impl FleetWatcher {
    /// Creates a watcher publishing to `routes` and reporting on `bus`.
    pub fn new(routes: ClusterRoutes, bus: Bus) -> Self {
        Self {
            routes,
            bus,
            descriptors: KeyedStore::new(),
            secrets: KeyedStore::new(),
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Wraps the watcher as a supervised loop consuming `feed`.
    pub fn into_loop(self, feed: mpsc::Receiver<Notification>) -> LoopRef {
        Arc::new(WatchLoop {
            watcher: Arc::new(self),
            feed: Mutex::new(Some(feed)),
        })
    }

    /// Processes notifications until `ctx` is cancelled or the feed closes.
    pub async fn run(
        &self,
        feed: &mut mpsc::Receiver<Notification>,
        ctx: CancellationToken,
    ) -> Result<(), LoopError> {
        loop {
            let next = tokio::select! {
                _ = ctx.cancelled() => return Err(LoopError::Canceled),
                next = feed.recv() => next,
            };
            let Some(notification) = next else {
                return Err(LoopError::fatal("control-plane feed closed"));
            };
            tokio::select! {
                _ = ctx.cancelled() => return Err(LoopError::Canceled),
                _ = self.handle(notification) => {}
            }
        }
    }

    /// Applies one notification.
    pub async fn handle(&self, notification: Notification) {
        match notification {
            Notification::ClusterAdded(desc) => {
                self.descriptors.put(desc.key().to_string(), desc.clone());
                self.reconcile(&desc).await;
            }
            Notification::ClusterUpdated { old, new } => {
                self.descriptors.put(new.key().to_string(), new.clone());
                if let (Ok(before), Ok(after)) = (self.build(&old), self.build(&new)) {
                    if before.same_identity(&after) {
                        debug!(cluster = %new.key(), "descriptor update without identity change");
                        return;
                    }
                }
                self.reconcile(&new).await;
            }
            Notification::ClusterDeleted(tombstone) => {
                let key = match tombstone {
                    Tombstone::Object(desc) => desc.key(),
                    Tombstone::Key(key) => key,
                };
                self.remove(&key).await;
            }
            Notification::SecretAdded(secret) => {
                self.secrets.put(secret.key().to_string(), secret.clone());
                self.reconcile_referencing(&secret.key()).await;
            }
            Notification::SecretUpdated { old, new } => {
                self.secrets.put(new.key().to_string(), new.clone());
                if old.data == new.data {
                    debug!(secret = %new.key(), "secret update without data change");
                    return;
                }
                self.reconcile_referencing(&new.key()).await;
            }
            Notification::SecretDeleted(tombstone) => {
                let key = match tombstone {
                    Tombstone::Object(secret) => secret.key(),
                    Tombstone::Key(key) => key,
                };
                // Engines keep their API handles; the next descriptor change re-resolves.
                self.secrets.delete(&key.to_string());
            }
        }
    }

    /// Builds the cluster for `desc` without claiming its technical id.
    fn build(&self, desc: &ClusterDescriptor) -> Result<Cluster, WatchError> {
        let cluster = desc.key().to_string();

        if !self.routes.contains(&desc.provider_type) {
            return Err(WatchError::UnsupportedProvider {
                cluster,
                provider: desc.provider_type.clone(),
            });
        }
        let label = |label: &'static str| {
            desc.labels
                .get(label)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| WatchError::MissingLabel {
                    cluster: cluster.clone(),
                    label,
                })
        };
        let account_id = label(ACCOUNT_ID_LABEL)?;
        let subaccount_id = label(SUBACCOUNT_ID_LABEL)?;

        let secret = self
            .secrets
            .get(&desc.secret_ref.to_string())
            .ok_or_else(|| WatchError::SecretNotFound {
                cluster: cluster.clone(),
                secret: desc.secret_ref.to_string(),
            })?;

        Ok(Cluster {
            provider_type: desc.provider_type.clone(),
            region: desc.region.clone(),
            technical_id: technical_id(&desc.namespace, &desc.name),
            account_id,
            subaccount_id,
            credential_data: secret.data.into(),
            deleted: false,
            trial: desc.purpose.as_deref() == Some(TRIAL_PURPOSE),
        })
    }

    /// Records `owner` as the only descriptor allowed to publish `technical_id`.
    fn claim(&self, technical_id: &str, owner: &str) -> Result<(), WatchError> {
        let mut owners = self.owners.lock();
        match owners.get(technical_id) {
            Some(current) if current != owner => Err(WatchError::DuplicateTechnicalId {
                technical_id: technical_id.to_string(),
                cluster: owner.to_string(),
                owner: current.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                owners.insert(technical_id.to_string(), owner.to_string());
                Ok(())
            }
        }
    }

    async fn reconcile(&self, desc: &ClusterDescriptor) {
        let owner = desc.key().to_string();
        let built = self
            .build(desc)
            .and_then(|c| self.claim(&c.technical_id, &owner).map(|()| c));

        match built {
            Ok(cluster) => self.publish(cluster).await,
            Err(err) => self.bus.publish(
                RuntimeEvent::new(RuntimeEventKind::ClusterSkipped)
                    .with_cluster(owner)
                    .with_reason(err.to_string()),
            ),
        }
    }

    async fn reconcile_referencing(&self, secret: &ObjectKey) {
        for desc in self.descriptors.filter(|d| &d.secret_ref == secret) {
            self.reconcile(&desc).await;
        }
    }

    async fn publish(&self, cluster: Cluster) {
        let Some(tx) = self.routes.get(&cluster.provider_type) else {
            return;
        };
        let event = RuntimeEvent::new(RuntimeEventKind::ClusterPublished)
            .with_cluster(cluster.technical_id.as_str())
            .with_provider(cluster.provider_type.as_str());
        if tx.send(cluster).await.is_err() {
            debug!("polling engine is gone; cluster change dropped");
            return;
        }
        self.bus.publish(event);
    }

    async fn remove(&self, key: &ObjectKey) {
        let owner = key.to_string();
        self.descriptors.delete(&owner);

        let technical_id = technical_id(&key.namespace, &key.name);
        {
            let mut owners = self.owners.lock();
            match owners.get(&technical_id) {
                // A rejected duplicate never reached the engines.
                Some(current) if *current != owner => return,
                Some(_) => {
                    owners.remove(&technical_id);
                }
                None => {}
            }
        }

        for (provider, tx) in self.routes.iter() {
            if tx.send(Cluster::deleted(technical_id.as_str())).await.is_err() {
                debug!(%provider, "polling engine is gone; cluster deletion dropped");
            }
        }
        self.bus.publish(
            RuntimeEvent::new(RuntimeEventKind::ClusterPublished)
                .with_cluster(technical_id)
                .with_reason("deleted"),
        );
    }
}

struct WatchLoop {
    watcher: Arc<FleetWatcher>,
    feed: Mutex<Option<mpsc::Receiver<Notification>>>,
}

impl Loop for WatchLoop {
    fn name(&self) -> &str {
        "fleet-watcher"
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxLoopFuture {
        let watcher = Arc::clone(&self.watcher);
        let feed = self.feed.lock().take();
        Box::pin(async move {
            let mut feed = feed.ok_or_else(|| LoopError::fatal("watcher feed already consumed"))?;
            watcher.run(&mut feed, ctx).await
        })
    }
}
