//! # Event delivery client.
//!
//! ```text
//! events rx ──► intake ──► RateLimitedQueue<Arc<Event>> ──► W workers ──► IngestionSink
//!                                 ▲                              │
//!                                 └── add_rate_limited ◄─ retryable failure, requeues < max
//! ```
//!
//! - success: `forget`, `DeliverySucceeded`;
//! - [`DeliveryError::Serialization`]: dropped at once, never retried;
//! - anything else: retried with backoff until `max_retries` requeues, then dropped.
//!
//! Intake stops when the channel closes or the stop signal fires; the queue is
//! then shut down and workers drain what is ready. Delivery is at most
//! `max_retries + 1` attempts per event, not guaranteed.

mod event;
mod sink;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use event::Event;
pub use sink::{HttpIngestionClient, IngestionSink};

use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, LoopError};
use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};
use crate::loops::{BoxLoopFuture, Loop, LoopRef};
use crate::queue::RateLimitedQueue;

/// Pushes events to the ingestion endpoint with bounded concurrency and retries.
pub struct DeliveryClient {
    sink: Arc<dyn IngestionSink>,
    cfg: DeliveryConfig,
    queue: RateLimitedQueue<Arc<Event>>,
    bus: Bus,
}

impl DeliveryClient {
    /// Creates a client delivering through `sink`.
    pub fn new(sink: Arc<dyn IngestionSink>, cfg: DeliveryConfig, bus: Bus) -> Self {
        let queue = RateLimitedQueue::new(cfg.backoff());
        Self {
            sink,
            cfg,
            queue,
            bus,
        }
    }

    /// Wraps the client as a supervised loop consuming `events`.
    pub fn into_loop(self, events: mpsc::Receiver<Event>) -> LoopRef {
        Arc::new(DeliveryLoop {
            client: Arc::new(self),
            events: Mutex::new(Some(events)),
        })
    }

    /// Runs intake and workers until the channel closes or `ctx` is cancelled.
    pub async fn run(
        self: &Arc<Self>,
        events: &mut mpsc::Receiver<Event>,
        ctx: CancellationToken,
    ) -> Result<(), LoopError> {
        let mut workers = JoinSet::new();
        for _ in 0..self.cfg.workers.max(1) {
            let this = Arc::clone(self);
            workers.spawn(async move { this.work().await });
        }

        let res = loop {
            tokio::select! {
                _ = ctx.cancelled() => break Err(LoopError::Canceled),
                next = events.recv() => match next {
                    Some(ev) => self.queue.add(Arc::new(ev)),
                    None => break Ok(()),
                },
            }
        };

        self.queue.shut_down();
        while workers.join_next().await.is_some() {}
        res
    }

    async fn work(&self) {
        while let Some(ev) = self.queue.get().await {
            self.deliver(&ev).await;
            self.queue.done(&ev);
        }
    }

    /// One delivery attempt plus its retry decision.
    async fn deliver(&self, ev: &Arc<Event>) {
        let attempt = match ev.body() {
            Ok(body) => self.sink.send(&ev.tenant_key, body).await,
            Err(err) => Err(err),
        };

        match attempt {
            Ok(()) => {
                self.queue.forget(ev);
                self.bus.publish(
                    RuntimeEvent::new(RuntimeEventKind::DeliverySucceeded)
                        .with_event(ev.id)
                        .with_tenant(ev.tenant_key.as_str()),
                );
            }
            Err(err) if err.is_terminal() => self.drop_event(ev, &err),
            Err(err) => {
                let requeues = self.queue.num_requeues(ev);
                if requeues < self.cfg.max_retries && !self.queue.is_shutting_down() {
                    let delay = self.queue.add_rate_limited(Arc::clone(ev));
                    self.bus.publish(
                        RuntimeEvent::new(RuntimeEventKind::DeliveryRetryScheduled)
                            .with_event(ev.id)
                            .with_tenant(ev.tenant_key.as_str())
                            .with_attempt(requeues + 1)
                            .with_delay(delay)
                            .with_reason(err.to_string()),
                    );
                } else {
                    self.drop_event(ev, &err);
                }
            }
        }
    }

    fn drop_event(&self, ev: &Arc<Event>, err: &DeliveryError) {
        self.queue.forget(ev);
        self.bus.publish(
            RuntimeEvent::new(RuntimeEventKind::DeliveryDropped)
                .with_event(ev.id)
                .with_tenant(ev.tenant_key.as_str())
                .with_reason(err.to_string()),
        );
    }
}

struct DeliveryLoop {
    client: Arc<DeliveryClient>,
    events: Mutex<Option<mpsc::Receiver<Event>>>,
}

impl Loop for DeliveryLoop {
    fn name(&self) -> &str {
        "event-delivery"
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxLoopFuture {
        let client = Arc::clone(&self.client);
        let events = self.events.lock().take();
        Box::pin(async move {
            let mut events =
                events.ok_or_else(|| LoopError::fatal("delivery channel already consumed"))?;
            client.run(&mut events, ctx).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;

    /// Answers from a script, then with `fallback`; records when each call happened.
    struct ScriptedSink {
        script: Mutex<VecDeque<Result<(), u16>>>,
        fallback: Result<(), u16>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedSink {
        fn new(script: Vec<Result<(), u16>>, fallback: Result<(), u16>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl IngestionSink for ScriptedSink {
        async fn send(&self, tenant: &str, _body: Vec<u8>) -> Result<(), DeliveryError> {
            self.calls.lock().push((tenant.to_string(), Instant::now()));
            let next = self.script.lock().pop_front().unwrap_or(self.fallback);
            next.map_err(DeliveryError::from_status)
        }
    }

    fn cfg(max_retries: u32) -> DeliveryConfig {
        DeliveryConfig {
            workers: 2,
            max_retries,
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(60),
            ..DeliveryConfig::default()
        }
    }

    fn payload() -> Vec<u8> {
        br#"{"compute":{"provisionedCpus":4}}"#.to_vec()
    }

    /// Feeds `events`, closes the channel after `settle`, returns the loop result.
    async fn deliver_all(
        client: Arc<DeliveryClient>,
        events: Vec<Event>,
        settle: Duration,
    ) -> Result<(), LoopError> {
        let (tx, mut rx) = mpsc::channel(8);
        for ev in events {
            tx.send(ev).await.unwrap();
        }
        let ctx = CancellationToken::new();
        let run = tokio::spawn({
            let ctx = ctx.clone();
            async move { client.run(&mut rx, ctx).await }
        });
        tokio::time::sleep(settle).await;
        drop(tx);
        run.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_event_is_sent_once() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let client = Arc::new(DeliveryClient::new(sink.clone(), cfg(5), bus));

        let ev = Event::new("sa-1", payload());
        let id = ev.id;
        deliver_all(client.clone(), vec![ev], Duration::from_secs(30))
            .await
            .unwrap();

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "sa-1");
        let done = rx.try_recv().unwrap();
        assert_eq!(done.kind, RuntimeEventKind::DeliverySucceeded);
        assert_eq!(done.event, Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_dropped_without_sending() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let client = Arc::new(DeliveryClient::new(sink.clone(), cfg(5), bus));

        deliver_all(
            client,
            vec![Event::new("sa-1", b"{truncated".to_vec())],
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert!(sink.calls().is_empty());
        let dropped = rx.try_recv().unwrap();
        assert_eq!(dropped.kind, RuntimeEventKind::DeliveryDropped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_retried_up_to_max_then_dropped() {
        let sink = ScriptedSink::new(vec![], Err(500));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let client = Arc::new(DeliveryClient::new(sink.clone(), cfg(3), bus));

        deliver_all(
            client,
            vec![Event::new("sa-1", payload())],
            Duration::from_secs(120),
        )
        .await
        .unwrap();

        assert_eq!(sink.calls().len(), 4);
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(
            kinds,
            vec![
                RuntimeEventKind::DeliveryRetryScheduled,
                RuntimeEventKind::DeliveryRetryScheduled,
                RuntimeEventKind::DeliveryRetryScheduled,
                RuntimeEventKind::DeliveryDropped,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_three_times_then_accepted_with_growing_delays() {
        let sink = ScriptedSink::new(vec![Err(429), Err(429), Err(429), Ok(())], Ok(()));
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let client = Arc::new(DeliveryClient::new(sink.clone(), cfg(5), bus));

        deliver_all(
            client,
            vec![Event::new("sa-1", payload())],
            Duration::from_secs(120),
        )
        .await
        .unwrap();

        let calls = sink.calls();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert!(gaps[0] >= Duration::from_secs(1));
        assert!(gaps.windows(2).all(|w| w[1] > w[0]), "{gaps:?}");

        let mut succeeded = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == RuntimeEventKind::DeliverySucceeded {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_intake_and_workers() {
        let sink = ScriptedSink::new(vec![], Ok(()));
        let (_tx, rx) = mpsc::channel::<Event>(1);
        let l = DeliveryClient::new(sink, cfg(5), Bus::new(8)).into_loop(rx);
        let ctx = CancellationToken::new();
        let fut = l.spawn(ctx.clone());
        ctx.cancel();
        assert!(matches!(fut.await, Err(LoopError::Canceled)));
    }
}
