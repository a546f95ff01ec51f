//! PostgreSQL implementations of the chronik store and lock traits.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so builds do not require a live database. All queries are parameterized.

mod advisory_lock;
mod checkpoint_store;
mod event_store;
mod lease_lock;
mod pool;
pub mod schema;
mod snapshot_store;

pub use advisory_lock::PgAdvisoryLock;
pub use checkpoint_store::PgCheckpointStore;
pub use event_store::PgEventStore;
pub use lease_lock::{PgLeaseLock, DEFAULT_LEASE_TTL};
pub use pool::{PostgresConfig, PostgresPool};
pub use snapshot_store::PgSnapshotStore;

use chronik_core::error::EsError;

pub(crate) fn db_err(e: sqlx::Error) -> EsError {
    EsError::Infrastructure(e.to_string())
}
