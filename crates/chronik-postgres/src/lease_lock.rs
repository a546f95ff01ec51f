//! Lease-based projection lock with heartbeat renewal.
//!
//! A lease is a row in `es_projection_leases` with an expiry. Acquisition
//! is a single steal-or-fail upsert: the insert wins outright, or the
//! conflict update wins only when the existing lease has expired. A
//! background heartbeat renews the lease at a third of the TTL; a renewal
//! that matches no row means the lease was stolen, and the guard reports
//! itself no longer held. Crashed holders block successors for at most one
//! TTL.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use chronik_core::error::EsError;
use chronik_core::lock::{LockGuard, ProjectionLock};

use crate::db_err;

/// Default lease time-to-live.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Lease lock over the `es_projection_leases` table. Works through any
/// connection pooler, unlike the advisory lock.
#[derive(Clone)]
pub struct PgLeaseLock {
    pool: PgPool,
    ttl: Duration,
}

impl PgLeaseLock {
    /// Creates a lease lock with the default TTL.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ttl: DEFAULT_LEASE_TTL,
        }
    }

    /// Sets the lease TTL. The heartbeat renews at a third of it.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl std::fmt::Debug for PgLeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgLeaseLock")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProjectionLock for PgLeaseLock {
    async fn acquire(&self, projection_name: &str) -> Result<Option<Box<dyn LockGuard>>, EsError> {
        let holder_id = Uuid::new_v4().to_string();

        let won: Option<String> = sqlx::query_scalar(
            r"INSERT INTO es_projection_leases (projection_name, holder_id, acquired_at, renewed_at, expires_at)
              VALUES ($1, $2, NOW(), NOW(), NOW() + make_interval(secs => $3))
              ON CONFLICT (projection_name) DO UPDATE
              SET holder_id = EXCLUDED.holder_id,
                  acquired_at = NOW(),
                  renewed_at = NOW(),
                  expires_at = EXCLUDED.expires_at
              WHERE es_projection_leases.expires_at < NOW()
              RETURNING holder_id",
        )
        .bind(projection_name)
        .bind(&holder_id)
        .bind(self.ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if won.is_none() {
            return Ok(None);
        }
        tracing::debug!(projection = projection_name, holder = %holder_id, "lease acquired");

        let held = Arc::new(AtomicBool::new(true));
        let heartbeat = tokio::spawn(renew_loop(
            self.pool.clone(),
            projection_name.to_owned(),
            holder_id.clone(),
            self.ttl,
            Arc::clone(&held),
        ));

        Ok(Some(Box::new(PgLeaseGuard {
            pool: self.pool.clone(),
            name: projection_name.to_owned(),
            holder_id,
            held,
            heartbeat,
        })))
    }
}

async fn renew_loop(
    pool: PgPool,
    name: String,
    holder_id: String,
    ttl: Duration,
    held: Arc<AtomicBool>,
) {
    let interval = ttl / 3;
    let mut last_renewed = tokio::time::Instant::now();
    loop {
        tokio::time::sleep(interval).await;

        let result = sqlx::query(
            r"UPDATE es_projection_leases
              SET renewed_at = NOW(), expires_at = NOW() + make_interval(secs => $3)
              WHERE projection_name = $1 AND holder_id = $2",
        )
        .bind(&name)
        .bind(&holder_id)
        .bind(ttl.as_secs_f64())
        .execute(&pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => {
                last_renewed = tokio::time::Instant::now();
                tracing::trace!(projection = %name, "lease renewed");
            }
            Ok(_) => {
                // Stolen after expiry; stop renewing and tell the worker.
                tracing::warn!(projection = %name, "lease lost to another holder");
                held.store(false, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                tracing::warn!(projection = %name, error = %e, "lease renewal failed");
                // A full TTL without a successful renewal means the lease
                // has lapsed and another holder may own it now.
                if last_renewed.elapsed() >= ttl {
                    tracing::warn!(projection = %name, "lease lapsed without renewal");
                    held.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
}

struct PgLeaseGuard {
    pool: PgPool,
    name: String,
    holder_id: String,
    held: Arc<AtomicBool>,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl Drop for PgLeaseGuard {
    fn drop(&mut self) {
        // A guard dropped without release must not keep renewing; the
        // lease then lapses after at most one TTL.
        self.heartbeat.abort();
    }
}

#[async_trait]
impl LockGuard for PgLeaseGuard {
    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    async fn release(self: Box<Self>) {
        self.heartbeat.abort();
        if !self.held.load(Ordering::SeqCst) {
            return;
        }
        let result = sqlx::query(
            "DELETE FROM es_projection_leases WHERE projection_name = $1 AND holder_id = $2",
        )
        .bind(&self.name)
        .bind(&self.holder_id)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => tracing::debug!(projection = %self.name, "lease released"),
            // The lease expires on its own after the TTL.
            Err(e) => tracing::warn!(projection = %self.name, error = %e, "lease release failed"),
        }
    }
}
