//! Runtime core: lifecycle supervision.
//!
//! The only public API from this module is [`Supervisor`] (and its builder),
//! which runs the pipeline's long-running loops and unwinds all of them as
//! soon as one returns.
//!
//! Internal modules:
//! - [`supervisor`]: spawns loops, fail-fast shutdown, grace handling;
//! - [`builder`]: wires the bus and subscribers;
//! - [`shutdown`]: OS signal handling exposed as a loop.

mod builder;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use shutdown::{signal_loop, wait_for_shutdown_signal};
pub use supervisor::Supervisor;
