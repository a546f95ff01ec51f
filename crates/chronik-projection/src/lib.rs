//! Catch-up projection subsystem.
//!
//! A projection consumes the store-wide event log through a durable
//! checkpoint. The processor drives one fetch/apply/commit cycle at a
//! time; the runner owns a set of processors, one task each, paced by an
//! adaptive poll interval and guarded by a named cross-process lock.

mod processor;
mod projection;
mod runner;
mod shutdown;

pub use processor::{ErrorPolicy, ProcessorConfig, ProjectionProcessor, RetryConfig};
pub use projection::Projection;
pub use runner::{CatchUpRunner, PollConfig};
pub use shutdown::{shutdown_channel, spawn_signal_listener};
