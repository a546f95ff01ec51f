//! PostgreSQL event store.
//!
//! Appends run in one transaction: a per-stream advisory transaction lock
//! serializes writers to the same stream, the version check happens under
//! that lock, and the identity column assigns the store-wide global
//! position in commit order. Nothing is persisted when the precondition
//! fails.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use chronik_core::error::EsError;
use chronik_core::event::{EventEnvelope, StoredEvent};
use chronik_core::registry::EventTypeRegistry;
use chronik_core::store::{EventPublisher, EventStore};
use chronik_core::stream::{ExpectedVersion, ReadStart, StreamId};
use chronik_core::upcast::UpcasterRegistry;

use crate::db_err;

/// Event store over the `es_streams` and `es_events` tables.
pub struct PgEventStore {
    pool: PgPool,
    registry: Option<Arc<EventTypeRegistry>>,
    upcasters: Option<Arc<UpcasterRegistry>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

/// A row from `es_events`, converted to [`StoredEvent`] after the metadata
/// JSON is decoded.
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    stream_id: String,
    event_type: String,
    position: i64,
    global_position: i64,
    timestamp: DateTime<Utc>,
    data: serde_json::Value,
    metadata: serde_json::Value,
    schema_version: i32,
}

impl EventRow {
    fn into_stored(self) -> Result<StoredEvent, EsError> {
        Ok(StoredEvent {
            event_id: self.event_id,
            stream_id: self.stream_id,
            event_type: self.event_type,
            position: self.position,
            global_position: self.global_position,
            timestamp: self.timestamp,
            data: self.data,
            metadata: serde_json::from_value(self.metadata)?,
            schema_version: self.schema_version,
        })
    }
}

const SELECT_COLUMNS: &str = r"SELECT event_id, stream_id, event_type, position, global_position, timestamp, data, metadata, schema_version FROM es_events";

impl PgEventStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            registry: None,
            upcasters: None,
            publisher: None,
        }
    }

    /// Validates appended event types against a registry, canonicalizing
    /// aliases before storage.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<EventTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Applies the given upcaster chains to payloads on read.
    #[must_use]
    pub fn with_upcasters(mut self, upcasters: Arc<UpcasterRegistry>) -> Self {
        self.upcasters = Some(upcasters);
        self
    }

    /// Attaches an in-process publisher, invoked with each newly appended
    /// event after the transaction commits. Publisher errors are logged,
    /// not surfaced.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn upcast(&self, mut event: StoredEvent) -> StoredEvent {
        if let Some(upcasters) = &self.upcasters {
            event.data = upcasters.upcast(&event.event_type, event.data, event.schema_version);
        }
        event
    }

    fn rows_to_events(&self, rows: Vec<EventRow>) -> Result<Vec<StoredEvent>, EsError> {
        rows.into_iter()
            .map(|row| row.into_stored().map(|e| self.upcast(e)))
            .collect()
    }
}

impl std::fmt::Debug for PgEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventStore").finish_non_exhaustive()
    }
}

/// The stream-type tag is the id prefix before the first `-`, or the whole
/// id for unprefixed streams.
fn stream_type_of(stream_id: &str) -> &str {
    stream_id.split_once('-').map_or(stream_id, |(t, _)| t)
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append_to_stream(
        &self,
        stream_id: &StreamId,
        mut envelopes: Vec<EventEnvelope>,
        expected_version: ExpectedVersion,
    ) -> Result<i64, EsError> {
        if let Some(registry) = &self.registry {
            for envelope in &mut envelopes {
                envelope.event_type =
                    registry.canonicalize(&envelope.event_type, envelope.schema_version)?;
            }
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serialize writers to this stream for the rest of the
        // transaction; covers the create race two NoStream writers have.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(stream_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM es_streams WHERE stream_id = $1 FOR UPDATE")
                .bind(stream_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        if !expected_version.is_satisfied_by(current) {
            return Err(EsError::ConcurrencyConflict {
                stream_id: stream_id.to_string(),
                expected: expected_version,
                actual: current.unwrap_or(-1),
            });
        }

        let current_version = current.unwrap_or(-1);
        if envelopes.is_empty() {
            return Ok(current_version);
        }
        let new_version = current_version + envelopes.len() as i64;

        if current.is_some() {
            let updated = sqlx::query(
                "UPDATE es_streams SET version = $2, updated_at = NOW() WHERE stream_id = $1 AND version = $3",
            )
            .bind(stream_id.as_str())
            .bind(new_version)
            .bind(current_version)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if updated.rows_affected() != 1 {
                return Err(EsError::ConcurrencyConflict {
                    stream_id: stream_id.to_string(),
                    expected: expected_version,
                    actual: current_version,
                });
            }
        } else {
            sqlx::query("INSERT INTO es_streams (stream_id, stream_type, version) VALUES ($1, $2, $3)")
                .bind(stream_id.as_str())
                .bind(stream_type_of(stream_id.as_str()))
                .bind(new_version)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        let len = envelopes.len();
        let mut event_ids = Vec::with_capacity(len);
        let mut event_types = Vec::with_capacity(len);
        let mut positions = Vec::with_capacity(len);
        let mut payloads = Vec::with_capacity(len);
        let mut metadatas = Vec::with_capacity(len);
        let mut schema_versions = Vec::with_capacity(len);
        for (offset, envelope) in envelopes.iter().enumerate() {
            event_ids.push(Uuid::new_v4());
            event_types.push(envelope.event_type.clone());
            positions.push(current_version + 1 + offset as i64);
            payloads.push(envelope.data.clone());
            metadatas.push(serde_json::to_value(&envelope.metadata)?);
            schema_versions.push(envelope.schema_version);
        }

        // Multi-row INSERT using UNNEST; one round-trip per append.
        let returned: Vec<(i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r"INSERT INTO es_events (event_id, stream_id, event_type, position, data, metadata, schema_version)
              SELECT u.event_id, $2, u.event_type, u.position, u.data, u.metadata, u.schema_version
              FROM UNNEST($1::UUID[], $3::TEXT[], $4::BIGINT[], $5::JSONB[], $6::JSONB[], $7::INT[])
                  AS u(event_id, event_type, position, data, metadata, schema_version)
              RETURNING position, global_position, timestamp",
        )
        .bind(&event_ids)
        .bind(stream_id.as_str())
        .bind(&event_types)
        .bind(&positions)
        .bind(&payloads)
        .bind(&metadatas)
        .bind(&schema_versions)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::debug!(
            stream_id = %stream_id,
            count = len,
            new_version,
            "events appended"
        );

        if let Some(publisher) = &self.publisher {
            let mut assigned = returned;
            assigned.sort_unstable_by_key(|(position, ..)| *position);
            for (envelope, ((position, global_position, timestamp), event_id)) in
                envelopes.into_iter().zip(assigned.into_iter().zip(event_ids))
            {
                let event = StoredEvent {
                    event_id,
                    stream_id: stream_id.to_string(),
                    event_type: envelope.event_type,
                    position,
                    global_position,
                    timestamp,
                    data: envelope.data,
                    metadata: envelope.metadata,
                    schema_version: envelope.schema_version,
                };
                if let Err(e) = publisher.publish(&event).await {
                    tracing::warn!(
                        stream_id = %stream_id,
                        event_type = %event.event_type,
                        error = %e,
                        "in-process publish failed"
                    );
                }
            }
        }

        Ok(new_version)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        start: ReadStart,
        count: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EsError> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT version FROM es_streams WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        if exists.is_none() {
            return Err(EsError::StreamNotFound(stream_id.to_string()));
        }

        let limit: Option<i64> = count.map(|c| i64::try_from(c).unwrap_or(i64::MAX));
        let rows: Vec<EventRow> = match start {
            // LIMIT NULL means no limit.
            ReadStart::Start | ReadStart::At(_) => {
                let from = match start {
                    ReadStart::At(position) => position,
                    _ => 0,
                };
                sqlx::query_as(&format!(
                    "{SELECT_COLUMNS} WHERE stream_id = $1 AND position >= $2 ORDER BY position LIMIT $3"
                ))
                .bind(stream_id.as_str())
                .bind(from)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?
            }
            ReadStart::End => sqlx::query_as(&format!(
                "{SELECT_COLUMNS} WHERE stream_id = $1 ORDER BY position DESC LIMIT LEAST($2, 1)"
            ))
            .bind(stream_id.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
        };

        self.rows_to_events(rows)
    }

    async fn read_all(
        &self,
        after_position: i64,
        count: Option<usize>,
    ) -> Result<Vec<StoredEvent>, EsError> {
        let limit: Option<i64> = count.map(|c| i64::try_from(c).unwrap_or(i64::MAX));
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE global_position > $1 ORDER BY global_position LIMIT $2"
        ))
        .bind(after_position)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        self.rows_to_events(rows)
    }

    async fn stream_exists(&self, stream_id: &StreamId) -> Result<bool, EsError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM es_streams WHERE stream_id = $1)")
            .bind(stream_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}
