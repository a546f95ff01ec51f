//! Event envelopes and the durable stored-event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every event by the writer, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Free-form writer-supplied metadata.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventMetadata {
    /// Creates metadata with the given correlation and causation ids.
    #[must_use]
    pub fn new(correlation_id: Uuid, causation_id: Uuid) -> Self {
        Self {
            correlation_id,
            causation_id,
            extra: serde_json::Map::new(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        let correlation_id = Uuid::new_v4();
        Self::new(correlation_id, correlation_id)
    }
}

/// A domain event as supplied by a writer: payload plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Stable logical event name.
    pub event_type: String,
    /// Structured payload.
    pub data: serde_json::Value,
    /// Writer-supplied metadata.
    pub metadata: EventMetadata,
    /// Schema version of the payload shape (≥ 1).
    pub schema_version: i32,
}

impl EventEnvelope {
    /// Creates an envelope at schema version 1 with fresh default metadata.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: EventMetadata::default(),
            schema_version: 1,
        }
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the payload schema version.
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: i32) -> Self {
        self.schema_version = schema_version;
        self
    }
}

/// The durable, read-only event record. Created exactly once at append time;
/// never mutated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub stream_id: String,
    /// Stable logical event name.
    pub event_type: String,
    /// Per-stream position, 0-based and contiguous.
    pub position: i64,
    /// Store-wide monotonic position, 0-based.
    pub global_position: i64,
    /// Timestamp assigned at append.
    pub timestamp: DateTime<Utc>,
    /// Decoded payload (upcast on read where a chain is registered).
    pub data: serde_json::Value,
    /// Writer-supplied metadata.
    pub metadata: EventMetadata,
    /// Schema version the payload was written at (≥ 1).
    pub schema_version: i32,
}
