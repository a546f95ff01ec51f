//! Map-backed checkpoint store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use chronik_core::checkpoint::{Checkpoint, CheckpointStore};
use chronik_core::error::EsError;

/// One checkpoint per projection name. Saving overwrites.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projection_name: &str) -> Result<Option<Checkpoint>, EsError> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| EsError::Infrastructure("checkpoint store mutex poisoned".into()))?;
        Ok(checkpoints.get(projection_name).cloned())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), EsError> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| EsError::Infrastructure("checkpoint store mutex poisoned".into()))?;
        checkpoints.insert(checkpoint.projection_name.clone(), checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpoints_are_keyed_by_projection_name() {
        let store = InMemoryCheckpointStore::new();
        store.save(&Checkpoint::new("orders", 10)).await.unwrap();
        store.save(&Checkpoint::new("billing", 7)).await.unwrap();
        store.save(&Checkpoint::new("orders", 12)).await.unwrap();

        let orders = store.load("orders").await.unwrap().unwrap();
        assert_eq!(orders.position, 12);
        let billing = store.load("billing").await.unwrap().unwrap();
        assert_eq!(billing.position, 7);
        assert!(store.load("shipping").await.unwrap().is_none());
    }
}
