//! Snapshots: periodic state checkpoints that bound replay cost.
//!
//! Snapshots are advisory. Any correct implementation must also answer
//! correctly when the snapshot is stale or absent, by falling back to full
//! replay.

use async_trait::async_trait;

use crate::error::EsError;
use crate::stream::StreamId;

/// A materialized aggregate state at a given stream version. One snapshot
/// per stream; a newer snapshot overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    /// Stream this snapshot belongs to.
    pub stream_id: String,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// Stream version at capture time.
    pub version: i64,
    /// Type tag of the serialized state, checked on load.
    pub state_type: String,
}

/// Keyed snapshot persistence with upsert-by-stream semantics. No
/// referential integrity against the event log is enforced.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the snapshot for a stream, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, EsError>;

    /// Saves a snapshot, overwriting any previous one for the stream.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), EsError>;
}

/// Decides whether to materialize a new snapshot after an append.
pub trait SnapshotStrategy: Send + Sync {
    /// `new_version` is the stream version after the append;
    /// `events_since_snapshot` counts events past the stored snapshot
    /// (the full stream length when no snapshot exists).
    fn should_snapshot(&self, new_version: i64, events_since_snapshot: i64) -> bool;
}

/// Snapshots every `k` events.
#[derive(Debug, Clone, Copy)]
pub struct EveryN {
    threshold: i64,
}

impl EveryN {
    /// Creates the strategy.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Validation`] if `threshold < 1`.
    pub fn new(threshold: i64) -> Result<Self, EsError> {
        if threshold < 1 {
            return Err(EsError::Validation(format!(
                "snapshot threshold must be >= 1, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }
}

impl SnapshotStrategy for EveryN {
    fn should_snapshot(&self, _new_version: i64, events_since_snapshot: i64) -> bool {
        events_since_snapshot >= self.threshold
    }
}

/// Never snapshots; loads always fall back to full replay.
#[derive(Debug, Clone, Copy)]
pub struct Never;

impl SnapshotStrategy for Never {
    fn should_snapshot(&self, _new_version: i64, _events_since_snapshot: i64) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_n_rejects_threshold_below_one() {
        assert!(EveryN::new(0).is_err());
        assert!(EveryN::new(-3).is_err());
    }

    #[test]
    fn every_n_triggers_at_threshold() {
        let strategy = EveryN::new(3).unwrap();
        assert!(!strategy.should_snapshot(1, 2));
        assert!(strategy.should_snapshot(2, 3));
        assert!(strategy.should_snapshot(9, 4));
    }

    #[test]
    fn never_never_triggers() {
        assert!(!Never.should_snapshot(100, 100));
    }
}
