//! In-memory implementations of every chronik store and lock trait.
//!
//! Correct for single-process deployments and the default backend for
//! tests. Per-stream atomicity comes from a single mutex around the whole
//! store; the global position is a process-local counter.

mod checkpoint_store;
mod event_store;
mod lock;
mod snapshot_store;

pub use checkpoint_store::InMemoryCheckpointStore;
pub use event_store::InMemoryEventStore;
pub use lock::InMemoryProjectionLock;
pub use snapshot_store::InMemorySnapshotStore;
