//! Integration tests for the advisory and lease projection locks.

use std::time::Duration;

use sqlx::PgPool;

use chronik_core::lock::ProjectionLock;
use chronik_postgres::{PgAdvisoryLock, PgLeaseLock};

// --- advisory ---

#[sqlx::test(migrations = "../../migrations")]
async fn advisory_lock_is_exclusive_per_name(pool: PgPool) {
    let lock = PgAdvisoryLock::new(pool);

    let guard = lock.acquire("orders").await.unwrap().unwrap();
    assert!(guard.is_held());
    assert!(lock.acquire("orders").await.unwrap().is_none());
    assert!(lock.acquire("billing").await.unwrap().is_some());

    guard.release().await;
    assert!(lock.acquire("orders").await.unwrap().is_some());
}

// --- lease ---

#[sqlx::test(migrations = "../../migrations")]
async fn lease_refused_while_another_holder_is_alive(pool: PgPool) {
    let lock = PgLeaseLock::new(pool);

    let guard = lock.acquire("orders").await.unwrap().unwrap();
    assert!(guard.is_held());
    assert!(lock.acquire("orders").await.unwrap().is_none());

    guard.release().await;
    assert!(lock.acquire("orders").await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn expired_lease_of_a_dead_holder_is_stolen(pool: PgPool) {
    // A holder that crashed: its row is still there, already expired.
    sqlx::query(
        r"INSERT INTO es_projection_leases (projection_name, holder_id, acquired_at, renewed_at, expires_at)
          VALUES ('orders', 'dead-holder', NOW(), NOW(), NOW() - INTERVAL '1 second')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let lock = PgLeaseLock::new(pool);
    let guard = lock.acquire("orders").await.unwrap();
    assert!(guard.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn stolen_lease_marks_the_old_guard_not_held(pool: PgPool) {
    let lock = PgLeaseLock::new(pool.clone()).with_ttl(Duration::from_secs(1));
    let guard = lock.acquire("orders").await.unwrap().unwrap();
    assert!(guard.is_held());

    // Another holder takes the row out from under us; the next heartbeat
    // (at ttl/3) matches nothing and flips the flag.
    sqlx::query("UPDATE es_projection_leases SET holder_id = 'usurper' WHERE projection_name = 'orders'")
        .execute(&pool)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!guard.is_held());
}

#[sqlx::test(migrations = "../../migrations")]
async fn unrenewable_lease_is_not_held_past_its_ttl(pool: PgPool) {
    let lock = PgLeaseLock::new(pool.clone()).with_ttl(Duration::from_secs(1));
    let guard = lock.acquire("orders").await.unwrap().unwrap();
    assert!(guard.is_held());

    // Every renewal now errors. Once a full TTL passes without one
    // succeeding, the lease may belong to someone else.
    pool.close().await;

    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert!(!guard.is_held());
}
