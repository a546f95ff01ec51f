//! One projection's fetch/apply/commit cycle.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;

use chronik_core::checkpoint::{Checkpoint, CheckpointStore};
use chronik_core::error::EsError;
use chronik_core::lock::ProjectionLock;
use chronik_core::store::EventStore;

use crate::projection::Projection;

/// What to do when a batch fails to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Surface the error and stop the projection.
    Stop,
    /// Log, advance the checkpoint past the failed batch, continue.
    Skip,
    /// Back off and retry the same batch, up to a bounded attempt count.
    Retry,
}

/// Retry pacing: full-jitter exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Attempts after which the projection gives up.
    pub max_attempts: u32,
    /// First backoff ceiling; doubles per attempt.
    pub base_delay: Duration,
    /// Upper bound on the backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// The sleep before retry number `attempt` (0-based): uniform over
    /// `[0, min(base · 2^attempt, max_delay)]`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        rand::rng().random_range(Duration::ZERO..=exp)
    }
}

/// Processor configuration.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Maximum events fetched and applied per cycle.
    pub batch_size: usize,
    /// Failure handling for `apply` errors.
    pub error_policy: ErrorPolicy,
    /// Backoff settings, used when the policy is [`ErrorPolicy::Retry`].
    pub retry: RetryConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            error_policy: ErrorPolicy::Stop,
            retry: RetryConfig::default(),
        }
    }
}

/// Drives one projection against the global event log.
///
/// Each [`process_batch`](Self::process_batch) call is one cycle: load the
/// checkpoint, fetch the next batch strictly past it, apply, and commit
/// the checkpoint at the last applied global position. The checkpoint is
/// written only after a successful apply, so delivery is at-least-once.
pub struct ProjectionProcessor {
    store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    projection: Arc<dyn Projection>,
    config: ProcessorConfig,
    attempts: u32,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ProjectionProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        projection: Arc<dyn Projection>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            checkpoints,
            projection,
            config,
            attempts: 0,
            shutdown: None,
        }
    }

    /// Interrupts retry backoff sleeps when the signal turns true or every
    /// sender is dropped. The runner wires this up for its workers; a
    /// processor without a signal sleeps the full delay.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// The wrapped projection's name.
    #[must_use]
    pub fn projection_name(&self) -> &str {
        self.projection.name()
    }

    /// Runs one cycle and returns the number of events applied; zero means
    /// the projection is caught up (or a retryable failure backed off).
    ///
    /// # Errors
    ///
    /// Returns [`EsError::ProjectionStopped`] under [`ErrorPolicy::Stop`]
    /// and [`EsError::RetryExhausted`] when retries run out; both are
    /// fatal for this projection. Store and checkpoint failures pass
    /// through unchanged.
    pub async fn process_batch(&mut self) -> Result<usize, EsError> {
        let name = self.projection.name().to_owned();
        let checkpoint = self
            .checkpoints
            .load(&name)
            .await?
            .map_or(-1, |c| c.position);

        let events = self
            .store
            .read_all(checkpoint, Some(self.config.batch_size))
            .await?;
        if events.is_empty() {
            return Ok(0);
        }
        // Non-empty by the check above.
        let last_position = events[events.len() - 1].global_position;

        match self.projection.apply(&events).await {
            Ok(()) => {
                self.checkpoints
                    .save(&Checkpoint::new(&name, last_position))
                    .await?;
                self.attempts = 0;
                tracing::debug!(
                    projection = %name,
                    count = events.len(),
                    position = last_position,
                    "batch applied"
                );
                Ok(events.len())
            }
            Err(e) => match self.config.error_policy {
                ErrorPolicy::Stop => Err(EsError::ProjectionStopped {
                    projection: name,
                    reason: e.to_string(),
                }),
                ErrorPolicy::Skip => {
                    tracing::warn!(
                        projection = %name,
                        position = last_position,
                        error = %e,
                        "batch skipped"
                    );
                    self.checkpoints
                        .save(&Checkpoint::new(&name, last_position))
                        .await?;
                    self.attempts = 0;
                    Ok(0)
                }
                ErrorPolicy::Retry => {
                    self.attempts += 1;
                    if self.attempts >= self.config.retry.max_attempts {
                        return Err(EsError::RetryExhausted {
                            projection: name,
                            attempts: self.attempts,
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.config.retry.backoff_delay(self.attempts - 1);
                    tracing::warn!(
                        projection = %name,
                        attempt = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "batch failed, backing off"
                    );
                    self.backoff(delay).await;
                    Ok(0)
                }
            },
        }
    }

    /// Rebuilds the projection from scratch: truncate the read model,
    /// reset the checkpoint, replay the whole log. Runs under the named
    /// lock so no second worker feeds the projection meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::ProjectionStopped`] when the lock is held
    /// elsewhere; apply failures follow the configured error policy.
    pub async fn rebuild(&mut self, lock: &dyn ProjectionLock) -> Result<(), EsError> {
        let name = self.projection.name().to_owned();
        let Some(guard) = lock.acquire(&name).await? else {
            return Err(EsError::ProjectionStopped {
                projection: name,
                reason: "rebuild lock held by another worker".to_owned(),
            });
        };

        tracing::info!(projection = %name, "rebuild started");
        let result = self.rebuild_locked(&name).await;
        guard.release().await;
        match &result {
            Ok(()) => tracing::info!(projection = %name, "rebuild finished"),
            Err(e) => tracing::error!(projection = %name, error = %e, "rebuild failed"),
        }
        result
    }

    async fn backoff(&mut self, delay: Duration) {
        let Some(signal) = self.shutdown.as_mut() else {
            tokio::time::sleep(delay).await;
            return;
        };
        if *signal.borrow() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = signal.changed() => {}
        }
    }

    async fn rebuild_locked(&mut self, name: &str) -> Result<(), EsError> {
        self.projection.truncate().await?;
        self.checkpoints.save(&Checkpoint::new(name, -1)).await?;
        self.attempts = 0;
        loop {
            if self.process_batch().await? == 0 {
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for ProjectionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionProcessor")
            .field("config", &self.config)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_ceiling_doubles_then_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        for _ in 0..50 {
            assert!(retry.backoff_delay(0) <= Duration::from_millis(100));
            assert!(retry.backoff_delay(1) <= Duration::from_millis(200));
            assert!(retry.backoff_delay(2) <= Duration::from_millis(350));
            assert!(retry.backoff_delay(30) <= Duration::from_millis(350));
        }
    }
}
