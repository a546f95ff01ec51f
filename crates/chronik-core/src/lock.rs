//! Cross-process mutual exclusion for projection workers.

use async_trait::async_trait;

use crate::error::EsError;

/// Named lock preventing two processes from running the same catch-up
/// projection concurrently. It does not protect the event store itself,
/// which enforces its own optimistic-concurrency invariant.
#[async_trait]
pub trait ProjectionLock: Send + Sync {
    /// Attempts to acquire the named lock.
    ///
    /// Returns `Some(guard)` if the caller now exclusively holds the lock,
    /// `None` if another holder has it — in that case no work must be
    /// performed and no shared state mutated.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn acquire(&self, projection_name: &str) -> Result<Option<Box<dyn LockGuard>>, EsError>;
}

/// A held lock. Guards must be released on every exit path; each
/// implementation also has a backstop for abnormal exits (session end for
/// advisory locks, TTL expiry for leases).
#[async_trait]
pub trait LockGuard: Send + Sync {
    /// Returns false once the lock is no longer owned by this holder
    /// (a lease stolen after its TTL lapsed). Work in the critical section
    /// must stop as soon as this turns false.
    fn is_held(&self) -> bool;

    /// Releases the lock. Release failures are logged, not escalated; the
    /// implementation's backstop bounds how long a dead holder can block.
    async fn release(self: Box<Self>);
}
