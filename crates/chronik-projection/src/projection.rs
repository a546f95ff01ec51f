//! The projection seam.

use async_trait::async_trait;

use chronik_core::error::EsError;
use chronik_core::event::StoredEvent;

/// A read-model fed from the store-wide event log.
///
/// `apply` receives batches in global-position order and must be
/// idempotent at the batch boundary: after a crash between apply and
/// checkpoint commit, the same batch is delivered again.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Unique projection name; the checkpoint and lock key.
    fn name(&self) -> &str;

    /// Applies one batch of events to the read model.
    ///
    /// # Errors
    ///
    /// Any error is handled by the processor's error policy.
    async fn apply(&self, events: &[StoredEvent]) -> Result<(), EsError>;

    /// Clears the read model before a rebuild. The default does nothing,
    /// for projections with external teardown.
    ///
    /// # Errors
    ///
    /// Failures abort the rebuild before the checkpoint is reset.
    async fn truncate(&self) -> Result<(), EsError> {
        Ok(())
    }
}
