//! # Supervised loop abstractions.
//!
//! - [`Loop`] trait for long-running, cancelable pipeline stages
//! - [`LoopFn`] closure-backed implementation
//! - [`LoopRef`] shared handle (`Arc<dyn Loop>`)

mod loop_fn;
mod runnable;

pub use loop_fn::LoopFn;
pub use runnable::{BoxLoopFuture, Loop, LoopRef};
