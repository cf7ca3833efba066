//! # Long-running, cancelable unit supervised by the [`Supervisor`](crate::Supervisor).
//!
//! A loop receives the shared stop signal as a [`CancellationToken`] and must
//! return promptly once it is cancelled. Returning at all, with `Ok` or `Err`,
//! makes the supervisor stop every other loop.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::error::LoopError;

/// Boxed future returned by [`Loop::spawn`].
pub type BoxLoopFuture = Pin<Box<dyn Future<Output = Result<(), LoopError>> + Send + 'static>>;

/// Shared handle to a loop.
pub type LoopRef = Arc<dyn Loop>;

/// # Asynchronous, cancelable pipeline stage.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use fleetmeter::{BoxLoopFuture, Loop};
///
/// struct Heartbeat;
///
/// impl Loop for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     fn spawn(&self, ctx: CancellationToken) -> BoxLoopFuture {
///         Box::pin(async move {
///             ctx.cancelled().await;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Loop: Send + Sync + 'static {
    /// Stable, human-readable name used in runtime events.
    fn name(&self) -> &str;

    /// Creates the loop's future; called exactly once per supervisor run.
    fn spawn(&self, ctx: CancellationToken) -> BoxLoopFuture;
}
