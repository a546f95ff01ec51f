//! PostgreSQL checkpoint store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use chronik_core::checkpoint::{Checkpoint, CheckpointStore};
use chronik_core::error::EsError;

use crate::db_err;

/// Checkpoint store over the `es_checkpoints` table. One row per
/// projection name, upserted on save.
#[derive(Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgCheckpointStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, projection_name: &str) -> Result<Option<Checkpoint>, EsError> {
        let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT position, updated_at FROM es_checkpoints WHERE projection_name = $1",
        )
        .bind(projection_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(position, updated_at)| Checkpoint {
            projection_name: projection_name.to_owned(),
            position,
            updated_at,
        }))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), EsError> {
        sqlx::query(
            r"INSERT INTO es_checkpoints (projection_name, position, updated_at)
              VALUES ($1, $2, NOW())
              ON CONFLICT (projection_name) DO UPDATE
              SET position = EXCLUDED.position,
                  updated_at = NOW()",
        )
        .bind(&checkpoint.projection_name)
        .bind(checkpoint.position)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
