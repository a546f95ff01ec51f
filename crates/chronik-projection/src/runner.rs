//! Task-per-projection catch-up runner with adaptive polling.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;

use chronik_core::lock::ProjectionLock;

use crate::processor::ProjectionProcessor;

/// Adaptive poll pacing: tight while events flow, relaxed when idle.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Interval right after a batch made progress.
    pub min_interval: Duration,
    /// Ceiling the interval grows to while idle.
    pub max_interval: Duration,
    /// Growth per idle cycle.
    pub step: Duration,
    /// Relative jitter applied to every sleep, `0.0..1.0`.
    pub jitter_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            step: Duration::from_millis(250),
            jitter_factor: 0.1,
        }
    }
}

impl PollConfig {
    /// The next interval: reset to the minimum on progress, grow by one
    /// step (capped) when idle.
    #[must_use]
    pub fn next_interval(&self, current: Duration, made_progress: bool) -> Duration {
        if made_progress {
            self.min_interval
        } else {
            current.saturating_add(self.step).min(self.max_interval)
        }
    }

    /// Applies ±`jitter_factor` to an interval so co-located workers
    /// spread their polls.
    #[must_use]
    pub fn jittered(&self, interval: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return interval;
        }
        let spread = rand::rng().random_range(-self.jitter_factor..=self.jitter_factor);
        interval.mul_f64(1.0 + spread)
    }
}

struct Worker {
    processor: ProjectionProcessor,
    lock: Arc<dyn ProjectionLock>,
}

/// Owns a set of projection processors and runs each on its own task.
///
/// One projection's fatal error never touches its siblings; the runner
/// logs the outcome per task and returns once every task has finished.
pub struct CatchUpRunner {
    workers: Vec<Worker>,
    poll: PollConfig,
}

impl CatchUpRunner {
    /// Creates an empty runner with the given pacing.
    #[must_use]
    pub fn new(poll: PollConfig) -> Self {
        Self {
            workers: Vec::new(),
            poll,
        }
    }

    /// Adds a projection processor with its cross-process lock.
    #[must_use]
    pub fn register(mut self, processor: ProjectionProcessor, lock: Arc<dyn ProjectionLock>) -> Self {
        self.workers.push(Worker { processor, lock });
        self
    }

    /// Runs all projections until the shutdown signal turns true and each
    /// worker has released its lock.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        for worker in self.workers {
            let poll = self.poll;
            let shutdown = shutdown.clone();
            tasks.spawn(run_worker(worker, poll, shutdown));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "projection task panicked");
            }
        }
        tracing::info!("catch-up runner stopped");
    }
}

impl std::fmt::Debug for CatchUpRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatchUpRunner")
            .field("projections", &self.workers.len())
            .field("poll", &self.poll)
            .finish()
    }
}

async fn run_worker(worker: Worker, poll: PollConfig, mut shutdown: watch::Receiver<bool>) {
    let Worker { processor, lock } = worker;
    let mut processor = processor.with_shutdown(shutdown.clone());
    let name = processor.projection_name().to_owned();

    let guard = match lock.acquire(&name).await {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            tracing::info!(projection = %name, "lock held elsewhere, not starting");
            return;
        }
        Err(e) => {
            tracing::error!(projection = %name, error = %e, "lock acquisition failed");
            return;
        }
    };
    tracing::info!(projection = %name, "catch-up worker started");

    let mut interval = poll.min_interval;
    loop {
        if *shutdown.borrow() {
            tracing::info!(projection = %name, "shutting down");
            break;
        }
        if !guard.is_held() {
            tracing::warn!(projection = %name, "lock lost, stopping");
            break;
        }

        match processor.process_batch().await {
            Ok(applied) => {
                interval = poll.next_interval(interval, applied > 0);
            }
            Err(e) => {
                tracing::error!(projection = %name, error = %e, "projection failed");
                break;
            }
        }

        tokio::select! {
            () = tokio::time::sleep(poll.jittered(interval)) => {}
            changed = shutdown.changed() => {
                // Every sender is gone: nothing can ever signal shutdown,
                // and a closed channel resolves immediately on each
                // iteration. Stop instead of spinning past the sleep.
                if changed.is_err() {
                    tracing::info!(projection = %name, "shutdown channel closed, stopping");
                    break;
                }
            }
        }
    }

    guard.release().await;
    tracing::info!(projection = %name, "catch-up worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_resets_on_progress_and_grows_to_the_cap_when_idle() {
        let poll = PollConfig {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(500),
            step: Duration::from_millis(250),
            jitter_factor: 0.0,
        };

        let mut interval = poll.min_interval;
        interval = poll.next_interval(interval, false);
        assert_eq!(interval, Duration::from_millis(350));
        interval = poll.next_interval(interval, false);
        assert_eq!(interval, Duration::from_millis(500));
        interval = poll.next_interval(interval, false);
        assert_eq!(interval, Duration::from_millis(500));
        interval = poll.next_interval(interval, true);
        assert_eq!(interval, Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_the_configured_spread() {
        let poll = PollConfig {
            jitter_factor: 0.2,
            ..PollConfig::default()
        };
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = poll.jittered(base);
            assert!(jittered >= Duration::from_millis(800));
            assert!(jittered <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let poll = PollConfig {
            jitter_factor: 0.0,
            ..PollConfig::default()
        };
        assert_eq!(poll.jittered(Duration::from_secs(1)), Duration::from_secs(1));
    }
}
