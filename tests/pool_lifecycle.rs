use std::sync::Arc;
use std::time::Duration;

use sql_bridge::prelude::*;
use sql_bridge::test_utils::ScriptedDriver;

fn pool_over(driver: &ScriptedDriver) -> Pool {
    Pool::builder(Arc::new(driver.clone())).build()
}

#[tokio::test]
async fn acquire_reuses_released_connections_fifo() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    let pool = pool_over(&driver);

    let c1 = pool.acquire(AcquireOptions::default()).await.unwrap();
    let c2 = pool.acquire(AcquireOptions::default()).await.unwrap();
    assert_eq!(script.connect_count(), 2);
    assert_eq!(pool.checked_out_count(), 2);
    assert_eq!(pool.idle_count(), 0);

    let first_id = c1.id();
    pool.release(c1).await;
    pool.release(c2).await;
    assert_eq!(pool.idle_count(), 2);
    assert_eq!(pool.checked_out_count(), 0);

    // Oldest idle connection comes back first.
    let again = pool.acquire(AcquireOptions::default()).await.unwrap();
    assert_eq!(again.id(), first_id);
    assert_eq!(script.connect_count(), 2);
    pool.release(again).await;
}

#[tokio::test]
async fn idle_list_never_exceeds_max_idle() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    let pool = Pool::builder(Arc::new(driver.clone())).max_idle(1).build();

    let c1 = pool.acquire(AcquireOptions::default()).await.unwrap();
    let c2 = pool.acquire(AcquireOptions::default()).await.unwrap();
    pool.release(c1).await;
    pool.release(c2).await;

    assert_eq!(pool.idle_count(), 1);
    assert_eq!(script.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_connect_failures_are_retried_with_backoff() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    script.fail_connects(3, true);
    let pool = Pool::builder(Arc::new(driver.clone()))
        .connect_timeout(Some(Duration::from_secs(10)))
        .build();

    let started = tokio::time::Instant::now();
    let conn = pool.acquire(AcquireOptions::default()).await.unwrap();
    // Three backoff sleeps: 100ms + 140ms + 196ms.
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(436), "waited {waited:?}");
    assert_eq!(script.connect_count(), 1);
    pool.release(conn).await;
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_raises_connect_timeout() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    script.fail_connects(50, true);
    let pool = Pool::builder(Arc::new(driver.clone()))
        .connect_timeout(Some(Duration::from_millis(500)))
        .build();

    let err = pool.acquire(AcquireOptions::default()).await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::ConnectTimeout { .. }), "{err}");
    assert_eq!(script.connect_count(), 0);
}

#[tokio::test]
async fn non_retryable_connect_failure_propagates_immediately() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    script.fail_connects(1, false);
    let pool = Pool::builder(Arc::new(driver.clone()))
        .connect_timeout(Some(Duration::from_secs(10)))
        .build();

    let err = pool.acquire(AcquireOptions::default()).await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::Connect { retryable: false, .. }), "{err}");
    assert_eq!(script.connect_count(), 0);
}

#[tokio::test]
async fn no_timeout_means_no_retry() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    script.fail_connects(1, true);
    let pool = pool_over(&driver);

    let err = pool.acquire(AcquireOptions::default()).await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::Connect { retryable: true, .. }), "{err}");
    assert_eq!(script.connect_count(), 0);

    // The queued failure is gone, so the next acquire succeeds untouched.
    let conn = pool.acquire(AcquireOptions::default()).await.unwrap();
    pool.release(conn).await;
}

#[tokio::test]
async fn released_closed_connection_is_dropped_from_bookkeeping() {
    let driver = ScriptedDriver::new();
    let pool = pool_over(&driver);

    let mut conn = pool.acquire(AcquireOptions::default()).await.unwrap();
    conn.close().await.unwrap();
    pool.release(conn).await;

    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.checked_out_count(), 0);
}

#[tokio::test]
async fn discard_on_release_bypasses_the_idle_list() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    let pool = pool_over(&driver);

    let conn = pool.acquire(AcquireOptions::default()).await.unwrap();
    script.set_discard_on_release(true);
    pool.release(conn).await;

    assert_eq!(pool.idle_count(), 0);
    assert_eq!(script.close_count(), 1);
}

#[tokio::test]
async fn non_idle_connection_is_rolled_back_before_recycling() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    let pool = pool_over(&driver);

    let mut conn = pool
        .acquire(AcquireOptions { autocommit: false })
        .await
        .unwrap();
    conn.execute("INSERT INTO t VALUES (1)", BindParams::None)
        .await
        .unwrap();
    pool.release(conn).await;

    assert!(script.statements().contains(&"ROLLBACK".to_string()));
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(script.close_count(), 0);
}

#[tokio::test]
async fn force_close_skips_recycling() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    let pool = pool_over(&driver);

    let conn = pool.acquire(AcquireOptions::default()).await.unwrap();
    pool.release_with(conn, true, true).await;

    assert_eq!(pool.idle_count(), 0);
    assert_eq!(script.close_count(), 1);
}

#[tokio::test]
async fn close_is_idempotent_and_blocks_new_acquires() {
    let driver = ScriptedDriver::new();
    let script = driver.script();
    let pool = pool_over(&driver);

    let conn = pool.acquire(AcquireOptions::default()).await.unwrap();
    let idle = pool.acquire(AcquireOptions::default()).await.unwrap();
    pool.release(idle).await;

    pool.close().await;
    pool.close().await;
    assert_eq!(script.close_count(), 1);

    // A checked-out connection is closed as it comes back.
    pool.release(conn).await;
    assert_eq!(script.close_count(), 2);
    assert_eq!(pool.idle_count(), 0);

    let err = pool.acquire(AcquireOptions::default()).await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::Config(_)));
}

#[tokio::test]
async fn scoped_release_returns_the_connection() {
    let driver = ScriptedDriver::new();
    let pool = pool_over(&driver);

    let mut scoped = pool.scoped(AcquireOptions::default()).await.unwrap();
    scoped
        .execute("SELECT 1", BindParams::None)
        .await
        .unwrap();
    scoped.release().await;

    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.checked_out_count(), 0);
}

#[tokio::test]
async fn scoped_release_happens_on_early_error_paths() {
    let driver = ScriptedDriver::new();
    let pool = pool_over(&driver);

    async fn failing(pool: &Pool) -> Result<(), SqlBridgeError> {
        let mut scoped = pool.scoped(AcquireOptions::default()).await?;
        // Commit without begin: the error must not strand the connection.
        let result = scoped.commit().await;
        scoped.release().await;
        result
    }

    assert!(failing(&pool).await.is_err());
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.checked_out_count(), 0);
}

#[tokio::test]
async fn dropped_scoped_handle_is_returned_as_a_backstop() {
    let driver = ScriptedDriver::new();
    let pool = pool_over(&driver);

    let before = ScopedConnection::leaked_drops();
    {
        let _scoped = pool.scoped(AcquireOptions::default()).await.unwrap();
    }
    assert_eq!(ScopedConnection::leaked_drops(), before + 1);

    // The Drop backstop spawns the release; let it run.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.checked_out_count(), 0);
}
