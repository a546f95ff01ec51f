//! Catch-up runner behavior: locking, isolation, shutdown.

use std::sync::Arc;
use std::time::Duration;

use chronik_core::event::EventEnvelope;
use chronik_core::lock::ProjectionLock;
use chronik_core::store::EventStore;
use chronik_core::stream::{ExpectedVersion, StreamId};
use chronik_memory::{InMemoryCheckpointStore, InMemoryEventStore, InMemoryProjectionLock};
use chronik_projection::{
    CatchUpRunner, ErrorPolicy, PollConfig, ProcessorConfig, ProjectionProcessor,
};
use chronik_test_support::{CountingProjection, FailingProjection};

async fn seed(store: &InMemoryEventStore, count: usize) {
    let stream_id = StreamId::new("Order-1").unwrap();
    let envelopes = (0..count)
        .map(|i| EventEnvelope::new("TestEvent", serde_json::json!({"i": i})))
        .collect();
    store
        .append_to_stream(&stream_id, envelopes, ExpectedVersion::Any)
        .await
        .unwrap();
}

fn fast_poll() -> PollConfig {
    PollConfig {
        min_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(10),
        step: Duration::from_millis(1),
        jitter_factor: 0.0,
    }
}

fn processor(
    store: &Arc<InMemoryEventStore>,
    checkpoints: &Arc<InMemoryCheckpointStore>,
    projection: Arc<CountingProjection>,
) -> ProjectionProcessor {
    ProjectionProcessor::new(
        store.clone(),
        checkpoints.clone(),
        projection,
        ProcessorConfig::default(),
    )
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn runner_catches_up_and_stops_on_shutdown() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let projection = Arc::new(CountingProjection::new("orders"));
    let lock = Arc::new(InMemoryProjectionLock::new());
    seed(&store, 4).await;

    let runner = CatchUpRunner::new(fast_poll())
        .register(processor(&store, &checkpoints, projection.clone()), lock.clone());
    let (tx, rx) = chronik_projection::shutdown_channel();
    let handle = tokio::spawn(runner.run(rx));

    {
        let projection = projection.clone();
        wait_until(move || projection.applied_count() == 4).await;
    }

    // New events keep flowing while the worker polls.
    seed(&store, 2).await;
    {
        let projection = projection.clone();
        wait_until(move || projection.applied_count() == 6).await;
    }

    tx.send(true).unwrap();
    handle.await.unwrap();

    // The worker released its lock on the way out.
    assert!(lock.acquire("orders").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn dropped_shutdown_sender_stops_the_worker() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let projection = Arc::new(CountingProjection::new("orders"));
    let lock = Arc::new(InMemoryProjectionLock::new());
    seed(&store, 2).await;

    let runner = CatchUpRunner::new(fast_poll())
        .register(processor(&store, &checkpoints, projection.clone()), lock.clone());
    let (tx, rx) = chronik_projection::shutdown_channel();
    drop(tx);

    // With no sender left, the worker finishes its cycle and stops
    // instead of polling forever.
    runner.run(rx).await;
    assert_eq!(projection.applied_count(), 2);
    assert!(lock.acquire("orders").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn worker_skips_when_the_lock_is_held_elsewhere() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let projection = Arc::new(CountingProjection::new("orders"));
    let lock = Arc::new(InMemoryProjectionLock::new());
    seed(&store, 3).await;

    let _held = lock.acquire("orders").await.unwrap().unwrap();

    let runner = CatchUpRunner::new(fast_poll())
        .register(processor(&store, &checkpoints, projection.clone()), lock);
    let (_tx, rx) = chronik_projection::shutdown_channel();

    // The only worker finds its lock taken and returns at once.
    runner.run(rx).await;
    assert_eq!(projection.applied_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_projections_failure_does_not_stop_its_sibling() {
    let store = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let healthy = Arc::new(CountingProjection::new("orders"));
    let lock = Arc::new(InMemoryProjectionLock::new());
    seed(&store, 3).await;

    let failing = ProjectionProcessor::new(
        store.clone(),
        checkpoints.clone(),
        Arc::new(FailingProjection::new("billing")),
        ProcessorConfig {
            error_policy: ErrorPolicy::Stop,
            ..ProcessorConfig::default()
        },
    );

    let runner = CatchUpRunner::new(fast_poll())
        .register(failing, lock.clone())
        .register(processor(&store, &checkpoints, healthy.clone()), lock.clone());
    let (tx, rx) = chronik_projection::shutdown_channel();
    let handle = tokio::spawn(runner.run(rx));

    {
        let healthy = healthy.clone();
        wait_until(move || healthy.applied_count() == 3).await;
    }

    tx.send(true).unwrap();
    handle.await.unwrap();

    // The failing worker stopped on its own and released its lock.
    assert!(lock.acquire("billing").await.unwrap().is_some());
}
