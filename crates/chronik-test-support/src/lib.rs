//! Test doubles and builders shared by chronik crates' tests.

mod clock;
mod event;
mod projection;

pub use clock::FixedClock;
pub use event::{stored_event, stored_events};
pub use projection::{CountingProjection, FailingProjection};
