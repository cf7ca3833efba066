//! # Closure-backed loop (`LoopFn`).
//!
//! [`LoopFn`] wraps `F: Fn(CancellationToken) -> Fut`, so stages can be wired
//! as plain async closures capturing their channels and stores.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use fleetmeter::{LoopError, LoopFn, LoopRef};
//!
//! let l: LoopRef = LoopFn::arc("ticker", |ctx: CancellationToken| async move {
//!     ctx.cancelled().await;
//!     Ok::<_, LoopError>(())
//! });
//! assert_eq!(l.name(), "ticker");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::LoopError;
use crate::loops::runnable::{BoxLoopFuture, Loop};

/// Function-backed loop implementation.
pub struct LoopFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> LoopFn<F> {
    /// Creates a new function-backed loop.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the loop and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Loop for LoopFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), LoopError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxLoopFuture {
        Box::pin((self.f)(ctx))
    }
}
