//! Per-projection read-position persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EsError;

/// The last global position a projection has durably applied (inclusive).
/// −1 means nothing has been processed yet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    /// Name of the projection this checkpoint belongs to.
    pub projection_name: String,
    /// Inclusive last-applied `global_position`.
    pub position: i64,
    /// When the checkpoint was last advanced.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time.
    #[must_use]
    pub fn new(projection_name: impl Into<String>, position: i64) -> Self {
        Self {
            projection_name: projection_name.into(),
            position,
            updated_at: Utc::now(),
        }
    }
}

/// Keyed checkpoint persistence with upsert-by-name semantics.
///
/// The store does not couple to the event log; "write the checkpoint only
/// after the batch has been durably projected" is the processor's
/// invariant, not the store's.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads a projection's checkpoint, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn load(&self, projection_name: &str) -> Result<Option<Checkpoint>, EsError>;

    /// Saves a checkpoint, overwriting any previous one for the name.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), EsError>;
}
