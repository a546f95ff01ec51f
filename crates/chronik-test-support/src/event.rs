//! Builders for stored events with sensible defaults.

use chrono::Utc;
use chronik_core::event::{EventMetadata, StoredEvent};
use uuid::Uuid;

/// Builds a stored event at the given positions.
#[must_use]
pub fn stored_event(stream_id: &str, position: i64, global_position: i64) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        stream_id: stream_id.to_owned(),
        event_type: "TestEvent".to_owned(),
        position,
        global_position,
        timestamp: Utc::now(),
        data: serde_json::json!({"position": position}),
        metadata: EventMetadata::default(),
        schema_version: 1,
    }
}

/// Builds `count` consecutive stored events for one stream, starting at
/// position and global position 0.
#[must_use]
pub fn stored_events(stream_id: &str, count: usize) -> Vec<StoredEvent> {
    (0..count)
        .map(|i| {
            let position = i64::try_from(i).unwrap_or(i64::MAX);
            stored_event(stream_id, position, position)
        })
        .collect()
}
