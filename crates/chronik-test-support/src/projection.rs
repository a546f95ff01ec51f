//! Projection test doubles.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use chronik_core::error::EsError;
use chronik_core::event::StoredEvent;
use chronik_projection::Projection;

/// Records every applied batch (as global positions) and can be told to
/// fail the first N applies.
#[derive(Debug)]
pub struct CountingProjection {
    name: String,
    batches: Mutex<Vec<Vec<i64>>>,
    fail_remaining: AtomicU32,
    truncations: AtomicU32,
}

impl CountingProjection {
    /// A projection that applies every batch successfully.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            batches: Mutex::new(Vec::new()),
            fail_remaining: AtomicU32::new(0),
            truncations: AtomicU32::new(0),
        }
    }

    /// Fails the first `count` applies, then succeeds.
    #[must_use]
    pub fn failing_first(name: &str, count: u32) -> Self {
        let projection = Self::new(name);
        projection.fail_remaining.store(count, Ordering::SeqCst);
        projection
    }

    /// The applied batches, each as its events' global positions.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<i64>> {
        self.batches.lock().unwrap().clone()
    }

    /// Total events applied across all batches.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }

    /// How many times `truncate` ran.
    #[must_use]
    pub fn truncations(&self) -> u32 {
        self.truncations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Projection for CountingProjection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, events: &[StoredEvent]) -> Result<(), EsError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(EsError::Infrastructure("induced apply failure".to_owned()));
        }
        self.batches
            .lock()
            .unwrap()
            .push(events.iter().map(|e| e.global_position).collect());
        Ok(())
    }

    async fn truncate(&self) -> Result<(), EsError> {
        self.truncations.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().clear();
        Ok(())
    }
}

/// A projection whose every apply fails.
#[derive(Debug)]
pub struct FailingProjection {
    name: String,
}

impl FailingProjection {
    /// Creates the projection.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }
}

#[async_trait]
impl Projection for FailingProjection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _events: &[StoredEvent]) -> Result<(), EsError> {
        Err(EsError::Infrastructure("apply always fails".to_owned()))
    }
}
