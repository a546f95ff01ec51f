//! Map-backed snapshot store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use chronik_core::error::EsError;
use chronik_core::snapshot::{Snapshot, SnapshotStore};
use chronik_core::stream::StreamId;

/// One snapshot per stream, keyed by stream id. Saving overwrites.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, EsError> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| EsError::Infrastructure("snapshot store mutex poisoned".into()))?;
        Ok(snapshots.get(stream_id.as_str()).cloned())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), EsError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| EsError::Infrastructure("snapshot store mutex poisoned".into()))?;
        snapshots.insert(snapshot.stream_id.clone(), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_overwrites_the_previous_snapshot() {
        let store = InMemorySnapshotStore::new();
        let stream_id = StreamId::new("Order-1").unwrap();

        for version in [2, 5] {
            store
                .save(&Snapshot {
                    stream_id: stream_id.to_string(),
                    state: json!({"version": version}),
                    version,
                    state_type: "Order".into(),
                })
                .await
                .unwrap();
        }

        let loaded = store.load(&stream_id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 5);
    }

    #[tokio::test]
    async fn load_of_unknown_stream_is_none() {
        let store = InMemorySnapshotStore::new();
        let stream_id = StreamId::new("Order-missing").unwrap();
        assert!(store.load(&stream_id).await.unwrap().is_none());
    }
}
