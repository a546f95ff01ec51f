//! Event store and publisher trait seams.

use async_trait::async_trait;

use crate::error::EsError;
use crate::event::{EventEnvelope, StoredEvent};
use crate::stream::{ExpectedVersion, ReadStart, StreamId};

/// The append-only per-stream log with a store-wide total order.
///
/// Implementations must make the precondition check and the append a single
/// atomic unit per stream (a lock, or a compare-and-swap on a version
/// column). Store-level errors are surfaced unchanged; no retries happen
/// below this trait.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of envelopes to a stream under an optimistic
    /// precondition, returning the stream's new current version.
    ///
    /// An empty batch is a no-op that returns the current version
    /// unchanged (after validating the precondition).
    ///
    /// # Errors
    ///
    /// Returns [`EsError::ConcurrencyConflict`] when the precondition does
    /// not hold; nothing is persisted in that case.
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        envelopes: Vec<EventEnvelope>,
        expected_version: ExpectedVersion,
    ) -> Result<i64, EsError>;

    /// Reads events from one stream in position order.
    ///
    /// `count` caps the batch size; `Some(0)` returns an empty batch but
    /// still validates stream existence.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::StreamNotFound`] if the stream has never been
    /// appended to.
    async fn read_stream(
        &self,
        stream_id: &StreamId,
        start: ReadStart,
        count: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EsError>;

    /// Reads events across all streams, ordered by `global_position` and
    /// strictly greater than `after_position`. An empty result is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn read_all(
        &self,
        after_position: i64,
        count: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EsError>;

    /// Returns true if the stream has at least one event.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Infrastructure`] on backend failures.
    async fn stream_exists(&self, stream_id: &StreamId) -> Result<bool, EsError>;
}

/// In-process dispatch boundary invoked after a successful append.
///
/// Stores publish one event at a time, fire-and-forget: publisher errors
/// are logged by the store and never surfaced to the appender. Durable
/// consumers use the catch-up runner instead.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Delivers one newly appended event.
    ///
    /// # Errors
    ///
    /// Any error is logged by the calling store and otherwise ignored.
    async fn publish(&self, event: &StoredEvent) -> Result<(), EsError>;
}
