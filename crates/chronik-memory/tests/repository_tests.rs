//! Aggregate repository behavior over the in-memory backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use chronik_core::error::EsError;
use chronik_core::event::{EventEnvelope, StoredEvent};
use chronik_core::repository::{Aggregate, AggregateRepository};
use chronik_core::snapshot::{EveryN, Never, Snapshot, SnapshotStore};
use chronik_core::store::EventStore;
use chronik_core::stream::{ExpectedVersion, StreamId};
use chronik_memory::{InMemoryEventStore, InMemorySnapshotStore};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    total: i64,
}

impl Aggregate for Counter {
    const AGGREGATE_TYPE: &'static str = "Counter";

    fn evolve(&mut self, event: &StoredEvent) {
        if event.event_type == "Incremented" {
            self.total += event.data["by"].as_i64().unwrap_or(0);
        }
    }
}

fn incremented(by: i64) -> EventEnvelope {
    EventEnvelope::new("Incremented", json!({"by": by}))
}

fn repository(
    events: Arc<InMemoryEventStore>,
    snapshots: Arc<InMemorySnapshotStore>,
    threshold: Option<i64>,
) -> AggregateRepository<Counter> {
    match threshold {
        Some(n) => AggregateRepository::new(events, snapshots, Box::new(EveryN::new(n).unwrap())),
        None => AggregateRepository::new(events, snapshots, Box::new(Never)),
    }
}

#[tokio::test]
async fn replay_reaches_the_same_state_every_time() {
    let events = Arc::new(InMemoryEventStore::new());
    let repo = repository(events, Arc::new(InMemorySnapshotStore::new()), None);

    repo.append(
        "c1",
        &Counter { total: 6 },
        vec![incremented(1), incremented(2), incremented(3)],
        ExpectedVersion::NoStream,
    )
    .await
    .unwrap();

    let (first, v1) = repo.load("c1").await.unwrap();
    let (second, v2) = repo.load("c1").await.unwrap();
    assert_eq!(first, Counter { total: 6 });
    assert_eq!(first, second);
    assert_eq!((v1, v2), (2, 2));
}

#[tokio::test]
async fn loading_an_unknown_aggregate_fails() {
    let repo = repository(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemorySnapshotStore::new()),
        None,
    );
    let result = repo.load("ghost").await;
    assert!(matches!(result, Err(EsError::AggregateNotFound(_))));
}

#[tokio::test]
async fn snapshot_fires_at_the_threshold_and_load_replays_only_the_delta() {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = repository(events.clone(), snapshots.clone(), Some(3));
    let stream_id = StreamId::for_aggregate("Counter", "c1").unwrap();

    // Two events: below the threshold, no snapshot yet.
    repo.append(
        "c1",
        &Counter { total: 3 },
        vec![incremented(1), incremented(2)],
        ExpectedVersion::NoStream,
    )
    .await
    .unwrap();
    assert!(snapshots.load(&stream_id).await.unwrap().is_none());

    // Third event crosses the threshold; snapshot captured at version 2.
    repo.append(
        "c1",
        &Counter { total: 6 },
        vec![incremented(3)],
        ExpectedVersion::Exact(1),
    )
    .await
    .unwrap();
    let snapshot = snapshots.load(&stream_id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.state_type, "Counter");

    // Two more events on top of the snapshot.
    repo.append(
        "c1",
        &Counter { total: 15 },
        vec![incremented(4), incremented(5)],
        ExpectedVersion::Exact(2),
    )
    .await
    .unwrap();

    let (state, version) = repo.load("c1").await.unwrap();
    assert_eq!(state, Counter { total: 15 });
    assert_eq!(version, 4);
}

#[tokio::test]
async fn stale_snapshot_is_topped_up_from_the_stream() {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let stream_id = StreamId::for_aggregate("Counter", "c1").unwrap();

    events
        .append_to_stream(
            &stream_id,
            vec![incremented(1), incremented(2), incremented(3)],
            ExpectedVersion::NoStream,
        )
        .await
        .unwrap();
    snapshots
        .save(&Snapshot {
            stream_id: stream_id.to_string(),
            state: serde_json::to_value(Counter { total: 1 }).unwrap(),
            version: 0,
            state_type: "Counter".into(),
        })
        .await
        .unwrap();

    let repo = repository(events, snapshots, None);
    let (state, version) = repo.load("c1").await.unwrap();
    assert_eq!(state, Counter { total: 6 });
    assert_eq!(version, 2);
}

#[tokio::test]
async fn snapshot_with_wrong_state_type_fails_fast() {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let stream_id = StreamId::for_aggregate("Counter", "c1").unwrap();

    snapshots
        .save(&Snapshot {
            stream_id: stream_id.to_string(),
            state: json!({"unrelated": true}),
            version: 3,
            state_type: "Invoice".into(),
        })
        .await
        .unwrap();

    let repo = repository(events, snapshots, None);
    let result = repo.load("c1").await;
    match result {
        Err(EsError::SnapshotTypeMismatch { expected, actual, .. }) => {
            assert_eq!(expected, "Counter");
            assert_eq!(actual, "Invoice");
        }
        other => panic!("expected SnapshotTypeMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_writers_cannot_both_win_the_same_version() {
    let events = Arc::new(InMemoryEventStore::new());
    let repo = repository(events, Arc::new(InMemorySnapshotStore::new()), None);

    repo.append(
        "c1",
        &Counter { total: 1 },
        vec![incremented(1)],
        ExpectedVersion::NoStream,
    )
    .await
    .unwrap();

    // Both writers loaded at version 0; only the first append lands.
    let first = repo
        .append(
            "c1",
            &Counter { total: 3 },
            vec![incremented(2)],
            ExpectedVersion::Exact(0),
        )
        .await;
    let second = repo
        .append(
            "c1",
            &Counter { total: 11 },
            vec![incremented(10)],
            ExpectedVersion::Exact(0),
        )
        .await;

    assert_eq!(first.unwrap(), 1);
    assert!(matches!(second, Err(EsError::ConcurrencyConflict { .. })));

    let (state, _) = repo.load("c1").await.unwrap();
    assert_eq!(state, Counter { total: 3 });
}
