//! # Supervisor: fail-fast lifecycle coordinator for the pipeline's loops.
//!
//! ## High-level architecture
//! ```text
//! run(loops):
//!   Loop[0]  Loop[1]  ...  Loop[N-1]
//!      │        │              │
//!      └──► JoinSet.spawn(loop.spawn(stop.child_token()))      (one per loop)
//!
//! first = join_next()                 ← whichever loop returns first, for any reason
//!   ├─► publish LoopStopped / LoopFailed
//!   ├─► publish ShutdownRequested
//!   ├─► stop.cancel()                 → every other loop observes its child token
//!   └─► wait_all_with_grace(cfg.grace):
//!          ├─ all joined   → publish AllStoppedWithin
//!          └─ grace passed → abort stragglers, publish GraceExceeded
//!
//! return first loop's result
//! ```
//!
//! The watcher, every polling engine, the delivery client and (optionally) the
//! OS-signal loop run under one supervisor: if any of them terminates, including
//! through a fatal setup error, the whole process unwinds.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::core::builder::SupervisorBuilder;
use crate::error::{LoopError, RuntimeError};
use crate::events::{Bus, RuntimeEvent, RuntimeEventKind};
use crate::loops::LoopRef;
use crate::subscribers::SubscriberSet;

/// How a loop ended.
enum Exit {
    Returned(Result<(), LoopError>),
    Panicked(String),
}

/// Coordinates a set of loops with fail-fast, cooperative shutdown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
}

impl Supervisor {
    /// Starts building a supervisor with the given configuration.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(cfg: SupervisorConfig, bus: Bus, subs: Arc<SubscriberSet>) -> Self {
        Self { cfg, bus, subs }
    }

    /// Event bus shared with every stage run by this supervisor.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Subscribers receiving this supervisor's events.
    pub fn subscribers(&self) -> &Arc<SubscriberSet> {
        &self.subs
    }

    /// Runs `loops` until the first one returns, then stops the others.
    ///
    /// Returns `Ok(())` for an empty list. Otherwise returns the first loop's
    /// outcome; a grace overrun is reported only when that outcome was `Ok`.
    pub async fn run(&self, loops: Vec<LoopRef>) -> Result<(), RuntimeError> {
        if loops.is_empty() {
            return Ok(());
        }

        let stop = CancellationToken::new();
        let mut set: JoinSet<(String, Exit)> = JoinSet::new();
        let mut running = BTreeSet::new();

        for l in loops {
            let name = l.name().to_string();
            self.bus
                .publish(RuntimeEvent::new(RuntimeEventKind::LoopStarting).with_name(name.as_str()));
            running.insert(name.clone());

            let fut = l.spawn(stop.child_token());
            set.spawn(async move {
                let exit = match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(res) => Exit::Returned(res),
                    Err(panic_err) => Exit::Panicked(panic_message(panic_err.as_ref())),
                };
                (name, exit)
            });
        }

        let first = match set.join_next().await {
            Some(Ok((name, exit))) => {
                running.remove(&name);
                self.report(&name, exit)
            }
            // Loops are never aborted before shutdown and panics are caught inside the task.
            Some(Err(join_err)) => Err(RuntimeError::LoopPanicked {
                name: join_err.to_string(),
            }),
            None => Ok(()),
        };

        self.bus.publish(RuntimeEvent::new(RuntimeEventKind::ShutdownRequested));
        stop.cancel();

        let grace = self.wait_all_with_grace(&mut set, &mut running).await;
        first.and(grace)
    }

    /// Publishes the terminal event of one loop and converts its exit into a result.
    fn report(&self, name: &str, exit: Exit) -> Result<(), RuntimeError> {
        match exit {
            Exit::Returned(Ok(())) | Exit::Returned(Err(LoopError::Canceled)) => {
                self.bus
                    .publish(RuntimeEvent::new(RuntimeEventKind::LoopStopped).with_name(name));
                Ok(())
            }
            Exit::Returned(Err(error)) => {
                self.bus.publish(
                    RuntimeEvent::new(RuntimeEventKind::LoopFailed)
                        .with_name(name)
                        .with_reason(error.to_string()),
                );
                Err(RuntimeError::LoopFailed {
                    name: name.to_string(),
                    error,
                })
            }
            Exit::Panicked(info) => {
                self.bus.publish(
                    RuntimeEvent::new(RuntimeEventKind::LoopFailed)
                        .with_name(name)
                        .with_reason(format!("panic: {info}")),
                );
                Err(RuntimeError::LoopPanicked {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Waits for the remaining loops within the configured grace period.
    async fn wait_all_with_grace(
        &self,
        set: &mut JoinSet<(String, Exit)>,
        running: &mut BTreeSet<String>,
    ) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let drain = async {
            while let Some(joined) = set.join_next().await {
                if let Ok((name, exit)) = joined {
                    running.remove(&name);
                    let _ = self.report(&name, exit);
                }
            }
        };

        match tokio::time::timeout(grace, drain).await {
            Ok(()) => {
                self.bus
                    .publish(RuntimeEvent::new(RuntimeEventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                set.abort_all();
                let stuck: Vec<String> = running.iter().cloned().collect();
                self.bus.publish(
                    RuntimeEvent::new(RuntimeEventKind::GraceExceeded)
                        .with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
