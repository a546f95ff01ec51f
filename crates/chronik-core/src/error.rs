//! Error taxonomy shared by every chronik backend.

use thiserror::Error;

use crate::stream::ExpectedVersion;

/// Top-level error type for store, snapshot, lock, and projection operations.
///
/// Store-level errors are surfaced to the caller unchanged; retry policy
/// lives in the projection processor, never inside a store.
#[derive(Debug, Error)]
pub enum EsError {
    /// A read targeted a stream that has never been appended to.
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// The append precondition did not hold. The caller must reload and
    /// retry with a fresh expected version.
    #[error("concurrency conflict on stream {stream_id}: expected {expected}, actual version {actual}")]
    ConcurrencyConflict {
        /// The stream that had the conflict.
        stream_id: String,
        /// The precondition that was supplied.
        expected: ExpectedVersion,
        /// The actual current version (−1 when the stream is absent).
        actual: i64,
    },

    /// An aggregate load found neither a stream nor a snapshot.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// A stored snapshot does not match the aggregate's current type.
    /// Fatal for that load; the payload is never silently coerced.
    #[error("snapshot type mismatch for stream {stream_id}: expected {expected}, found {actual}")]
    SnapshotTypeMismatch {
        /// Stream whose snapshot was rejected.
        stream_id: String,
        /// The aggregate type the caller expected.
        expected: String,
        /// The `state_type` recorded in the snapshot.
        actual: String,
    },

    /// An upcaster chain was misconfigured. Raised at construction, never
    /// at apply time.
    #[error("upcaster chain misconfigured: {0}")]
    UpcasterChain(String),

    /// A projection running under the STOP policy hit a failing batch.
    /// Fatal for that projection only.
    #[error("projection '{projection}' stopped: {reason}")]
    ProjectionStopped {
        /// Name of the stopped projection.
        projection: String,
        /// The underlying failure.
        reason: String,
    },

    /// A projection running under the RETRY policy exceeded its attempt
    /// limit. Fatal for that projection only.
    #[error("projection '{projection}' exhausted retries after {attempts} attempts: {reason}")]
    RetryExhausted {
        /// Name of the exhausted projection.
        projection: String,
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// The last underlying failure.
        reason: String,
    },

    /// A validation error in caller-supplied input or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Payload or snapshot (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
