//! Snapshot-aware aggregate loading and appending.
//!
//! The repository layers the snapshot read/write policy over an event
//! store and a snapshot store: load from snapshot plus delta when
//! possible, fall back to full replay otherwise, and materialize a new
//! snapshot after appends when the strategy says so.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EsError;
use crate::event::{EventEnvelope, StoredEvent};
use crate::snapshot::{Snapshot, SnapshotStore, SnapshotStrategy};
use crate::store::EventStore;
use crate::stream::{ExpectedVersion, ReadStart, StreamId};

/// State that reconstitutes by folding stored events.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync {
    /// Stable type name; the stream-id prefix and the snapshot
    /// `state_type` tag.
    const AGGREGATE_TYPE: &'static str;

    /// Applies one stored event to the state.
    fn evolve(&mut self, event: &StoredEvent);
}

/// Repository over one aggregate type, combining event store, snapshot
/// store, and a snapshot strategy.
pub struct AggregateRepository<A> {
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    strategy: Box<dyn SnapshotStrategy>,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Aggregate> AggregateRepository<A> {
    /// Creates a repository.
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        strategy: Box<dyn SnapshotStrategy>,
    ) -> Self {
        Self {
            events,
            snapshots,
            strategy,
            _marker: PhantomData,
        }
    }

    /// Loads an aggregate and its current version.
    ///
    /// With a snapshot present, only events past the snapshot version are
    /// replayed; otherwise the full stream is. A snapshot whose
    /// `state_type` does not match fails fast instead of misinterpreting
    /// the payload.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::AggregateNotFound`] when neither a snapshot nor
    /// a stream exists, and [`EsError::SnapshotTypeMismatch`] on a
    /// corrupt/incompatible snapshot.
    pub async fn load(&self, aggregate_id: &str) -> Result<(A, i64), EsError> {
        let stream_id = StreamId::for_aggregate(A::AGGREGATE_TYPE, aggregate_id)?;

        let (mut state, mut version) = match self.snapshots.load(&stream_id).await? {
            Some(snapshot) => {
                if snapshot.state_type != A::AGGREGATE_TYPE {
                    return Err(EsError::SnapshotTypeMismatch {
                        stream_id: stream_id.to_string(),
                        expected: A::AGGREGATE_TYPE.to_owned(),
                        actual: snapshot.state_type,
                    });
                }
                let state: A = serde_json::from_value(snapshot.state)?;
                (state, snapshot.version)
            }
            None => (A::default(), -1),
        };

        let delta = match self
            .events
            .read_stream(&stream_id, ReadStart::At(version + 1), None)
            .await
        {
            Ok(events) => events,
            // A snapshot without a stream is still a loadable aggregate;
            // no snapshot and no stream is not.
            Err(EsError::StreamNotFound(_)) if version >= 0 => Vec::new(),
            Err(EsError::StreamNotFound(_)) => {
                return Err(EsError::AggregateNotFound(aggregate_id.to_owned()));
            }
            Err(e) => return Err(e),
        };

        for event in &delta {
            state.evolve(event);
            version = event.position;
        }

        Ok((state, version))
    }

    /// Appends new envelopes and, when the strategy fires, materializes a
    /// snapshot of `state` (the aggregate after applying those events) at
    /// the new version, overwriting the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::ConcurrencyConflict`] when the precondition does
    /// not hold; snapshot write failures are surfaced as-is.
    pub async fn append(
        &self,
        aggregate_id: &str,
        state: &A,
        envelopes: Vec<EventEnvelope>,
        expected_version: ExpectedVersion,
    ) -> Result<i64, EsError> {
        let stream_id = StreamId::for_aggregate(A::AGGREGATE_TYPE, aggregate_id)?;

        let new_version = self
            .events
            .append_to_stream(&stream_id, envelopes, expected_version)
            .await?;

        if new_version >= 0 {
            let snapshot_version = self
                .snapshots
                .load(&stream_id)
                .await?
                .map_or(-1, |s| s.version);
            let events_since_snapshot = new_version - snapshot_version;

            if self.strategy.should_snapshot(new_version, events_since_snapshot) {
                let snapshot = Snapshot {
                    stream_id: stream_id.to_string(),
                    state: serde_json::to_value(state)?,
                    version: new_version,
                    state_type: A::AGGREGATE_TYPE.to_owned(),
                };
                self.snapshots.save(&snapshot).await?;
                tracing::debug!(
                    stream_id = %stream_id,
                    version = new_version,
                    "snapshot materialized"
                );
            }
        }

        Ok(new_version)
    }
}

impl<A> std::fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository").finish_non_exhaustive()
    }
}
