//! # Pipeline composition root.
//!
//! ```text
//! feed ──► fleet-watcher ──► clusters[azure] ──► polling-engine-azure ──┐
//!                       └──► clusters[...]   ──► polling-engine-...   ──┴──► events ──► event-delivery ──► sink
//!
//! os-signals (optional)
//! ```
//!
//! Every stage runs as one loop under a single [`Supervisor`]: whichever loop
//! returns first (feed closed, signal, failure) unwinds all the others.
//! Channels are bounded; a slow sink backs up into the engines and from there
//! into the watcher.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::core::{Supervisor, signal_loop};
use crate::delivery::{DeliveryClient, HttpIngestionClient, IngestionSink};
use crate::engine::PollingEngine;
use crate::error::{DeliveryError, RuntimeError};
use crate::events::Bus;
use crate::loops::LoopRef;
use crate::provider::ProviderRegistry;
use crate::subscribers::Subscribe;
use crate::watcher::{ClusterRoutes, FleetWatcher, Notification};

/// Wires watcher, engines and delivery together and runs them.
pub struct Pipeline {
    cfg: Config,
    providers: ProviderRegistry,
    sink: Arc<dyn IngestionSink>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl Pipeline {
    /// Creates a pipeline delivering through `sink`.
    pub fn new(cfg: Config, providers: ProviderRegistry, sink: Arc<dyn IngestionSink>) -> Self {
        Self {
            cfg,
            providers,
            sink,
            subscribers: Vec::new(),
        }
    }

    /// Creates a pipeline delivering to the configured HTTP endpoint.
    pub fn with_http_sink(cfg: Config, providers: ProviderRegistry) -> Result<Self, DeliveryError> {
        let client =
            HttpIngestionClient::new(cfg.delivery.endpoint.clone(), cfg.delivery.request_timeout)?;
        Ok(Self::new(cfg, providers, Arc::new(client)))
    }

    /// Adds runtime event subscribers (e.g. `LogWriter`).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Runs until the first loop returns, then unwinds the rest.
    pub async fn run(self, feed: mpsc::Receiver<Notification>) -> Result<(), RuntimeError> {
        let supervisor = Supervisor::builder(self.cfg.supervisor.clone())
            .with_subscribers(self.subscribers.clone())
            .build();
        let bus = supervisor.bus().clone();
        let loops = self.into_loops(feed, &bus);
        supervisor.run(loops).await
    }

    fn into_loops(self, feed: mpsc::Receiver<Notification>, bus: &Bus) -> Vec<LoopRef> {
        let (events_tx, events_rx) = mpsc::channel(self.cfg.polling.buffer.max(1));

        let mut routes = ClusterRoutes::new();
        let mut engines = Vec::with_capacity(self.providers.len());
        for provider in self.providers.iter() {
            let (tx, rx) = mpsc::channel(self.cfg.watcher.buffer.max(1));
            routes = routes.with_route(provider.name(), tx);
            let engine = PollingEngine::new(
                Arc::clone(provider),
                self.cfg.polling.clone(),
                events_tx.clone(),
                bus.clone(),
            );
            engines.push(engine.into_loop(rx));
        }
        drop(events_tx);

        let mut loops = vec![FleetWatcher::new(routes, bus.clone()).into_loop(feed)];
        loops.extend(engines);
        loops.push(DeliveryClient::new(self.sink, self.cfg.delivery, bus.clone()).into_loop(events_rx));
        if self.cfg.supervisor.handle_signals {
            loops.push(signal_loop());
        }
        loops
    }
}
