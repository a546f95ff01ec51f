//! PostgreSQL snapshot store.

use async_trait::async_trait;
use sqlx::PgPool;

use chronik_core::error::EsError;
use chronik_core::snapshot::{Snapshot, SnapshotStore};
use chronik_core::stream::StreamId;

use crate::db_err;

/// Snapshot store over the `es_snapshots` table. One row per stream,
/// upserted on save.
#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSnapshotStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, EsError> {
        let row: Option<(serde_json::Value, i64, String)> = sqlx::query_as(
            "SELECT state, version, state_type FROM es_snapshots WHERE stream_id = $1",
        )
        .bind(stream_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(state, version, state_type)| Snapshot {
            stream_id: stream_id.to_string(),
            state,
            version,
            state_type,
        }))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), EsError> {
        sqlx::query(
            r"INSERT INTO es_snapshots (stream_id, state, version, state_type)
              VALUES ($1, $2, $3, $4)
              ON CONFLICT (stream_id) DO UPDATE
              SET state = EXCLUDED.state,
                  version = EXCLUDED.version,
                  state_type = EXCLUDED.state_type,
                  updated_at = NOW()",
        )
        .bind(&snapshot.stream_id)
        .bind(&snapshot.state)
        .bind(snapshot.version)
        .bind(&snapshot.state_type)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
