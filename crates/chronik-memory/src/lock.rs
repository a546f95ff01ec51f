//! Single-process projection lock over a shared name set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use chronik_core::error::EsError;
use chronik_core::lock::{LockGuard, ProjectionLock};

/// Mutual exclusion between tasks of one process. Offers no protection
/// across processes; deployments with multiple workers need the advisory
/// or lease lock instead.
#[derive(Debug, Default)]
pub struct InMemoryProjectionLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryProjectionLock {
    /// Creates a lock provider with no names held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectionLock for InMemoryProjectionLock {
    async fn acquire(&self, projection_name: &str) -> Result<Option<Box<dyn LockGuard>>, EsError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| EsError::Infrastructure("lock set mutex poisoned".into()))?;
        if held.insert(projection_name.to_owned()) {
            Ok(Some(Box::new(InMemoryLockGuard {
                name: Some(projection_name.to_owned()),
                held: Arc::clone(&self.held),
            })))
        } else {
            Ok(None)
        }
    }
}

struct InMemoryLockGuard {
    // None once the name has been given back.
    name: Option<String>,
    held: Arc<Mutex<HashSet<String>>>,
}

fn remove_name(held: &Mutex<HashSet<String>>, name: &str) {
    match held.lock() {
        Ok(mut held) => {
            held.remove(name);
        }
        Err(_) => tracing::warn!(name = %name, "lock set mutex poisoned on release"),
    }
}

#[async_trait]
impl LockGuard for InMemoryLockGuard {
    fn is_held(&self) -> bool {
        // No TTL: an in-memory lock cannot be stolen while held.
        self.name.is_some()
    }

    async fn release(mut self: Box<Self>) {
        if let Some(name) = self.name.take() {
            remove_name(&self.held, &name);
        }
    }
}

impl Drop for InMemoryLockGuard {
    fn drop(&mut self) {
        // A guard dropped without release must not block its projection
        // forever.
        if let Some(name) = self.name.take() {
            remove_name(&self.held, &name);
        }
    }
}
