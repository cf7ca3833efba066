//! # Polling engine (one per provider).
//!
//! ```text
//! clusters rx ──► intake: connect, metadata, capabilities ──► instances store
//!                                  │
//!                                  ▼
//!                RateLimitedQueue<technical id> ──► W workers ──► collect (bounded by timeout)
//!                   ▲                                                │
//!                   └──────────── add_rate_limited ◄─────────────────┤
//!                                                                    ▼
//!                                                         events tx (Event per cluster)
//! ```
//!
//! Per-cluster lifecycle: `unseen → active ⇄ rate limited → evicted | removed`.
//!
//! - success: `forget`, reset `retry_attempts`, store and emit the new metrics,
//!   next poll after the base delay (`polling.interval`);
//! - failure: re-emit the last metrics if any, then by [`ErrorClass`]:
//!   - `NotFound` counts towards eviction (`retry_attempts > max_retries`),
//!   - `Throttled` and `Other` only back off.
//!
//! The queue guarantees a single worker per key, so a worker may read an
//! [`Instance`], collect without holding any lock, and write back its outcome.

mod instance;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use instance::Instance;

use crate::cluster::Cluster;
use crate::config::PollingConfig;
use crate::delivery::Event;
use crate::error::{ErrorClass, LoopError, ProviderError};
use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};
use crate::loops::{BoxLoopFuture, Loop, LoopRef};
use crate::provider::{CapabilitySet, ClusterMetadata, EventData, ManagementApi, MetricsProvider};
use crate::queue::RateLimitedQueue;
use crate::store::KeyedStore;

/// Payload delivered for one cluster: its identity plus the collected metrics.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageRecord<'a> {
    technical_id: &'a str,
    provider_type: &'a str,
    region: &'a str,
    global_account_id: &'a str,
    sub_account_id: &'a str,
    #[serde(flatten)]
    metrics: &'a EventData,
}

/// Periodically collects metrics for every cluster of one provider.
pub struct PollingEngine {
    name: String,
    provider: Arc<dyn MetricsProvider>,
    cfg: PollingConfig,
    instances: KeyedStore<Instance>,
    capabilities: KeyedStore<CapabilitySet>,
    queue: RateLimitedQueue<String>,
    events: mpsc::Sender<Event>,
    bus: Bus,
    stop: CancellationToken,
}

impl PollingEngine {
    /// Creates an engine emitting to `events`.
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        cfg: PollingConfig,
        events: mpsc::Sender<Event>,
        bus: Bus,
    ) -> Self {
        Self {
            name: format!("polling-engine-{}", provider.name()),
            queue: RateLimitedQueue::new(cfg.backoff()),
            provider,
            cfg,
            instances: KeyedStore::new(),
            capabilities: KeyedStore::new(),
            events,
            bus,
            stop: CancellationToken::new(),
        }
    }

    /// Loop name: `polling-engine-<provider>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-cluster state, keyed by technical id.
    pub fn instances(&self) -> &KeyedStore<Instance> {
        &self.instances
    }

    /// Capability sets, keyed by region.
    pub fn capabilities(&self) -> &KeyedStore<CapabilitySet> {
        &self.capabilities
    }

    /// Wraps the engine as a supervised loop consuming `clusters`.
    pub fn into_loop(self, clusters: mpsc::Receiver<Cluster>) -> LoopRef {
        Arc::new(EngineLoop {
            engine: Arc::new(self),
            clusters: Mutex::new(Some(clusters)),
        })
    }

    /// Runs intake and workers until the channel closes or `ctx` is cancelled.
    pub async fn run(
        self: &Arc<Self>,
        clusters: &mut mpsc::Receiver<Cluster>,
        ctx: CancellationToken,
    ) -> Result<(), LoopError> {
        let mut workers = JoinSet::new();
        for _ in 0..self.cfg.workers.max(1) {
            let this = Arc::clone(self);
            workers.spawn(async move { this.work().await });
        }

        let res = loop {
            let next = tokio::select! {
                _ = ctx.cancelled() => break Err(LoopError::Canceled),
                next = clusters.recv() => next,
            };
            let Some(cluster) = next else {
                break Ok(());
            };
            tokio::select! {
                _ = ctx.cancelled() => break Err(LoopError::Canceled),
                _ = self.on_cluster(cluster) => {}
            }
        };

        self.stop.cancel();
        self.queue.shut_down();
        while workers.join_next().await.is_some() {}
        res
    }

    /// Applies one cluster change from the watcher.
    pub async fn on_cluster(&self, cluster: Cluster) {
        let key = cluster.technical_id.clone();

        if cluster.deleted {
            self.queue.forget(&key);
            if self.instances.delete(&key).is_some() {
                self.publish(RuntimeEventKind::ClusterRemoved, &key);
            }
            return;
        }

        let client = match self.provider.connect(&cluster) {
            Ok(client) => client,
            Err(err) => {
                self.instances.delete(&key);
                self.queue.forget(&key);
                self.bus.publish(
                    RuntimeEvent::new(RuntimeEventKind::ClusterDropped)
                        .with_cluster(key)
                        .with_provider(self.provider.name())
                        .with_reason(err.to_string()),
                );
                return;
            }
        };

        let cached = self.instances.get(&key).and_then(|i| i.metadata);
        let metadata = match cached {
            Some(m) => Ok(m),
            None => self.metadata(client.as_ref(), &cluster).await,
        };
        self.ensure_capabilities(client.as_ref(), &cluster.region)
            .await;

        let (resolved, unresolved) = match metadata {
            Ok(m) => (Some(m), None),
            Err(err) => (None, Some(err)),
        };
        // A known cluster already has a poll scheduled; it picks the new values up.
        let known = self.instances.upsert(key.clone(), |prev| match prev {
            Some(mut inst) => {
                inst.cluster = cluster;
                inst.client = client;
                if inst.metadata.is_none() {
                    inst.metadata = resolved;
                }
                inst
            }
            None => Instance {
                metadata: resolved,
                ..Instance::new(cluster, client)
            },
        });

        if known {
            return;
        }
        match unresolved {
            None => self.queue.add(key),
            Some(err) => self.reschedule(&key, None, &err),
        }
    }

    async fn work(&self) {
        while let Some(key) = self.queue.get().await {
            if !self.stop.is_cancelled() {
                self.process(&key).await;
            }
            self.queue.done(&key);
        }
    }

    /// One poll of one cluster; the caller holds `key` in the queue.
    async fn process(&self, key: &String) {
        let Some(inst) = self.instances.get(key) else {
            // Deleted or evicted while waiting in the queue.
            self.queue.forget(key);
            return;
        };

        let metadata = match inst.metadata.clone() {
            Some(m) => m,
            None => match self.metadata(inst.client.as_ref(), &inst.cluster).await {
                Ok(m) => {
                    self.instances.update(key, |i| i.metadata = Some(m.clone()));
                    m
                }
                Err(err) => {
                    self.reschedule(key, None, &err);
                    return;
                }
            },
        };

        self.ensure_capabilities(inst.client.as_ref(), &inst.cluster.region)
            .await;
        let caps = self.capabilities.get(&inst.cluster.region);

        let collected = self
            .bounded(
                self.provider
                    .collect(inst.client.as_ref(), &inst.cluster, &metadata, caps.as_ref()),
            )
            .await;
        if self.stop.is_cancelled() {
            return;
        }

        match collected {
            Ok(data) => self.on_success(key, &inst, data).await,
            Err(err) => self.on_failure(key, &inst, err).await,
        }
    }

    async fn on_success(&self, key: &String, inst: &Instance, data: EventData) {
        self.queue.forget(key);
        let stored = self
            .instances
            .update(key, |i| {
                i.last_event = Some(data.clone());
                i.retry_attempts = 0;
            })
            .is_some();
        if !stored {
            return;
        }
        self.emit(&inst.cluster, &data, RuntimeEventKind::EventEmitted)
            .await;
        self.queue.add_rate_limited(key.clone());
    }

    async fn on_failure(&self, key: &String, inst: &Instance, err: ProviderError) {
        match &inst.last_event {
            Some(last) => {
                self.emit(&inst.cluster, last, RuntimeEventKind::FallbackEmitted)
                    .await
            }
            None => debug!(cluster = %key, "no previous metrics to fall back to"),
        }

        match err.class() {
            ErrorClass::NotFound => {
                let attempts = self.instances.update(key, |i| {
                    i.retry_attempts += 1;
                    i.retry_attempts
                });
                match attempts {
                    None => {}
                    Some(n) if n > self.cfg.max_retries => {
                        self.instances.delete(key);
                        self.queue.forget(key);
                        self.bus.publish(
                            RuntimeEvent::new(RuntimeEventKind::ClusterEvicted)
                                .with_cluster(key.as_str())
                                .with_provider(self.provider.name())
                                .with_attempt(n)
                                .with_reason(err.to_string()),
                        );
                    }
                    Some(n) => self.reschedule(key, Some(n), &err),
                }
            }
            ErrorClass::Throttled | ErrorClass::Other => {
                if self.instances.contains(key) {
                    self.reschedule(key, None, &err);
                }
            }
        }
    }

    /// Backs `key` off and reports why.
    fn reschedule(&self, key: &String, attempt: Option<u32>, err: &ProviderError) {
        let delay = self.queue.add_rate_limited(key.clone());
        let mut ev = RuntimeEvent::new(RuntimeEventKind::CollectFailed)
            .with_cluster(key.as_str())
            .with_provider(self.provider.name())
            .with_delay(delay)
            .with_reason(err.to_string());
        if let Some(n) = attempt {
            ev = ev.with_attempt(n);
        }
        self.bus.publish(ev);
    }

    /// Metadata for `cluster`; trial clusters fall back to empty metadata.
    async fn metadata(
        &self,
        api: &dyn ManagementApi,
        cluster: &Cluster,
    ) -> Result<ClusterMetadata, ProviderError> {
        match self
            .bounded(self.provider.resolve_metadata(api, cluster))
            .await
        {
            Ok(m) => Ok(m),
            Err(err) if cluster.trial => {
                debug!(cluster = %cluster.technical_id, error = %err, "trial cluster without metadata");
                Ok(ClusterMetadata::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Loads the capability set of `region` on first sight; best effort.
    async fn ensure_capabilities(&self, api: &dyn ManagementApi, region: &str) {
        if region.is_empty() || self.capabilities.contains(region) {
            return;
        }
        match self.bounded(self.provider.capabilities(api, region)).await {
            Ok(caps) => {
                self.capabilities.upsert(region, |prev| prev.unwrap_or(caps));
            }
            Err(err) => debug!(region, error = %err, "capabilities unavailable"),
        }
    }

    /// Runs a provider call under the poll timeout and the engine's stop signal.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        let timeout = self.cfg.timeout;
        tokio::select! {
            _ = self.stop.cancelled() => Err(ProviderError::Other {
                message: "polling stopped".to_string(),
            }),
            res = tokio::time::timeout(timeout, call) => {
                res.unwrap_or_else(|_| Err(ProviderError::Timeout { timeout }))
            }
        }
    }

    /// Sends `data` for `cluster` downstream; waits for channel capacity.
    async fn emit(&self, cluster: &Cluster, data: &EventData, kind: RuntimeEventKind) {
        let record = UsageRecord {
            technical_id: &cluster.technical_id,
            provider_type: &cluster.provider_type,
            region: &cluster.region,
            global_account_id: &cluster.account_id,
            sub_account_id: &cluster.subaccount_id,
            metrics: data,
        };
        let payload = match serde_json::to_vec(&record) {
            Ok(p) => p,
            Err(err) => {
                debug!(cluster = %cluster.technical_id, error = %err, "metrics not serializable");
                return;
            }
        };

        let event = Event::new(cluster.subaccount_id.as_str(), payload);
        let id = event.id;
        tokio::select! {
            _ = self.stop.cancelled() => return,
            sent = self.events.send(event) => {
                if sent.is_err() {
                    debug!("delivery client is gone; metrics dropped");
                    return;
                }
            }
        }
        self.bus.publish(
            RuntimeEvent::new(kind)
                .with_cluster(cluster.technical_id.as_str())
                .with_provider(self.provider.name())
                .with_event(id)
                .with_tenant(cluster.subaccount_id.as_str()),
        );
    }

    fn publish(&self, kind: RuntimeEventKind, key: &str) {
        self.bus.publish(
            RuntimeEvent::new(kind)
                .with_cluster(key)
                .with_provider(self.provider.name()),
        );
    }
}

struct EngineLoop {
    engine: Arc<PollingEngine>,
    clusters: Mutex<Option<mpsc::Receiver<Cluster>>>,
}

impl Loop for EngineLoop {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxLoopFuture {
        let engine = Arc::clone(&self.engine);
        let clusters = self.clusters.lock().take();
        Box::pin(async move {
            let mut clusters =
                clusters.ok_or_else(|| LoopError::fatal("cluster channel already consumed"))?;
            engine.run(&mut clusters, ctx).await
        })
    }
}
