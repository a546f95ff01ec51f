//! Session-level advisory lock for projection workers.
//!
//! The guard pins a pooled connection for its lifetime; the lock dies with
//! the session, which is the backstop for crashed holders. Incompatible
//! with transaction-mode connection poolers (pgbouncer et al.), where the
//! session does not survive the statement.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::pool::PoolConnection;

use chronik_core::error::EsError;
use chronik_core::lock::{LockGuard, ProjectionLock};

use crate::db_err;

/// `pg_try_advisory_lock` keyed by `hashtext(projection_name)`.
#[derive(Clone)]
pub struct PgAdvisoryLock {
    pool: PgPool,
}

impl PgAdvisoryLock {
    /// Creates a lock provider over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgAdvisoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgAdvisoryLock").finish_non_exhaustive()
    }
}

#[async_trait]
impl ProjectionLock for PgAdvisoryLock {
    async fn acquire(&self, projection_name: &str) -> Result<Option<Box<dyn LockGuard>>, EsError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(projection_name)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;

        if acquired {
            tracing::debug!(projection = projection_name, "advisory lock acquired");
            Ok(Some(Box::new(PgAdvisoryLockGuard {
                name: projection_name.to_owned(),
                conn: Some(conn),
            })))
        } else {
            Ok(None)
        }
    }
}

struct PgAdvisoryLockGuard {
    name: String,
    // Held for the guard's lifetime; the lock is session-scoped. None
    // once released.
    conn: Option<PoolConnection<sqlx::Postgres>>,
}

#[async_trait]
impl LockGuard for PgAdvisoryLockGuard {
    fn is_held(&self) -> bool {
        // Session locks cannot be stolen while the connection lives.
        self.conn.is_some()
    }

    async fn release(mut self: Box<Self>) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let result = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.name)
            .fetch_one(&mut *conn)
            .await;
        match result {
            Ok(true) => tracing::debug!(projection = %self.name, "advisory lock released"),
            Ok(false) => tracing::warn!(projection = %self.name, "advisory lock was not held"),
            // Closing the session releases the lock anyway.
            Err(e) => {
                tracing::warn!(projection = %self.name, error = %e, "advisory unlock failed");
                conn.detach();
            }
        }
    }
}

impl Drop for PgAdvisoryLockGuard {
    fn drop(&mut self) {
        // A guard dropped without release must not return a connection
        // that still holds the lock to the pool. Detaching closes the
        // session, which releases the lock.
        if let Some(conn) = self.conn.take() {
            tracing::warn!(projection = %self.name, "advisory lock guard dropped without release");
            conn.detach();
        }
    }
}
