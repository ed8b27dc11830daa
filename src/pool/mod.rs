//! The connection pool: a bounded cache of idle connections, bounded-retry
//! connect with exponential backoff, and release-time validation.
//!
//! Pool bookkeeping problems are self-healing — connections in a bad state
//! are discarded and recreated, surfaced only as `tracing` diagnostics, so
//! cleanup paths can never fail.

mod connection;
mod handle;

pub use connection::{AcquireOrigin, PooledConnection};
pub use handle::ScopedConnection;

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::dialect::Dialect;
use crate::driver::DriverAdapter;
use crate::error::SqlBridgeError;

const BACKOFF_SEED: Duration = Duration::from_millis(100);
const BACKOFF_MULTIPLIER: f64 = 1.4;

/// Per-acquisition options applied as part of the session reset, so every
/// acquired connection behaves as freshly opened regardless of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Requested session autocommit flag.
    pub autocommit: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self { autocommit: true }
    }
}

/// Fluent configuration for a [`Pool`].
pub struct PoolBuilder {
    driver: Arc<dyn DriverAdapter>,
    max_idle: usize,
    connect_timeout: Option<Duration>,
}

impl std::fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("max_idle", &self.max_idle)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl PoolBuilder {
    /// Cap on retained idle connections (default 2).
    #[must_use]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Overall budget for the connect-retry loop. `None` (the default)
    /// disables retrying entirely: the first failure propagates.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> Pool {
        Pool {
            inner: Arc::new(PoolInner {
                driver: self.driver,
                max_idle: self.max_idle,
                connect_timeout: self.connect_timeout,
                next_id: AtomicU64::new(0),
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    checked_out: HashSet::new(),
                    closed: false,
                }),
            }),
        }
    }
}

struct PoolState {
    idle: VecDeque<PooledConnection>,
    checked_out: HashSet<u64>,
    closed: bool,
}

struct PoolInner {
    driver: Arc<dyn DriverAdapter>,
    max_idle: usize,
    connect_timeout: Option<Duration>,
    next_id: AtomicU64,
    state: Mutex<PoolState>,
}

/// One pool per logical database target. Cheap to clone; clones share state.
///
/// Thread safety: acquire/release/close hold one internal mutex around the
/// idle list and checked-out set, so a single pool may be shared across
/// tasks. Individual connections are exclusively owned while checked out.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Pool")
            .field("max_idle", &self.inner.max_idle)
            .field("idle", &state.idle.len())
            .field("checked_out", &state.checked_out.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Start configuring a pool over `driver`.
    #[must_use]
    pub fn builder(driver: Arc<dyn DriverAdapter>) -> PoolBuilder {
        PoolBuilder {
            driver,
            max_idle: 2,
            connect_timeout: None,
        }
    }

    /// The rendering dialect of the underlying backend family.
    #[must_use]
    pub fn dialect(&self) -> &Dialect {
        self.inner.driver.dialect()
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Check out a connection: reuse an idle one (discarding any found
    /// already closed) or open a new one with bounded retry. The connection's
    /// session is reset to the requested baseline before it is handed out.
    ///
    /// The caller's source location is recorded as the acquisition origin for
    /// release-time diagnostics.
    ///
    /// # Errors
    /// Connect failures after the retry budget, non-retryable connect
    /// failures, or a closed pool.
    #[track_caller]
    pub fn acquire(
        &self,
        options: AcquireOptions,
    ) -> impl Future<Output = Result<PooledConnection, SqlBridgeError>> + '_ {
        let origin = AcquireOrigin::from(Location::caller());
        async move { self.acquire_at(options, origin).await }
    }

    /// Check out a connection wrapped in a [`ScopedConnection`] guard that
    /// returns it to the pool on every exit path.
    ///
    /// # Errors
    /// Same as [`Pool::acquire`].
    #[track_caller]
    pub fn scoped(
        &self,
        options: AcquireOptions,
    ) -> impl Future<Output = Result<ScopedConnection, SqlBridgeError>> + '_ {
        let origin = AcquireOrigin::from(Location::caller());
        async move {
            let conn = self.acquire_at(options, origin).await?;
            Ok(ScopedConnection::new(self.clone(), conn))
        }
    }

    async fn acquire_at(
        &self,
        options: AcquireOptions,
        origin: AcquireOrigin,
    ) -> Result<PooledConnection, SqlBridgeError> {
        let mut conn = loop {
            let popped = {
                let mut state = self.lock_state();
                if state.closed {
                    return Err(SqlBridgeError::Config("pool is closed".into()));
                }
                state.idle.pop_front()
            };
            match popped {
                Some(conn) if conn.is_closed() => {
                    // Defensive: a caller may have closed the raw connection
                    // out from under the pool.
                    tracing::debug!(id = conn.id(), "discarding externally-closed idle connection");
                }
                Some(conn) => break conn,
                None => break self.new_connection().await?,
            }
        };

        conn.set_origin(origin);
        if let Err(err) = conn.reset_session(options.autocommit).await {
            let _ = conn.close().await;
            return Err(err);
        }

        self.lock_state().checked_out.insert(conn.id());
        Ok(conn)
    }

    /// Open a raw connection, retrying transient failures with exponential
    /// backoff until the configured timeout elapses. No timeout means no
    /// retry: the first failure propagates.
    async fn new_connection(&self) -> Result<PooledConnection, SqlBridgeError> {
        let started = Instant::now();
        let mut delay = BACKOFF_SEED;
        let raw = loop {
            match self.inner.driver.connect().await {
                Ok(raw) => break raw,
                Err(err) => {
                    let Some(timeout) = self.inner.connect_timeout else {
                        return Err(err);
                    };
                    if !self.inner.driver.is_retryable_connect_error(&err) {
                        return Err(err);
                    }
                    let waited = started.elapsed();
                    if waited >= timeout {
                        tracing::warn!(?waited, error = %err, "connect retries exhausted");
                        return Err(SqlBridgeError::ConnectTimeout { waited });
                    }
                    tracing::debug!(?delay, error = %err, "transient connect failure, backing off");
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(BACKOFF_MULTIPLIER);
                }
            }
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection::new(
            raw,
            id,
            *self.inner.driver.dialect(),
        ))
    }

    /// Return a connection to the pool with default options: keep it if
    /// capacity allows, warn on non-idle status.
    pub async fn release(&self, conn: PooledConnection) {
        self.release_with(conn, false, true).await;
    }

    /// Return a connection, optionally forcing close and muting the non-idle
    /// warning. Never fails; anomalies are handled locally (rollback or
    /// discard) and surfaced only as diagnostics.
    pub async fn release_with(
        &self,
        mut conn: PooledConnection,
        force_close: bool,
        warn_on_non_idle: bool,
    ) {
        let id = conn.id();
        let should_close = {
            let mut state = self.lock_state();
            state.checked_out.remove(&id);
            force_close || state.closed || state.idle.len() >= self.inner.max_idle
        };

        if conn.is_closed() {
            return;
        }

        // The connection's own state can mandate discarding regardless of
        // capacity (e.g. unknown transaction status).
        if conn.must_discard_on_release() {
            tracing::debug!(id, "connection demands discard on release");
            self.close_quietly(&mut conn).await;
            return;
        }

        if let Some(status) = conn.non_idle_transaction_status() {
            if warn_on_non_idle {
                let origin = conn
                    .origin()
                    .map_or_else(|| "unknown".to_string(), |o| o.to_string());
                tracing::warn!(
                    id,
                    %origin,
                    %status,
                    "connection returned with non-idle transaction status"
                );
            }
            if !should_close && conn.rollback_for_recycle().await.is_err() {
                self.close_quietly(&mut conn).await;
                return;
            }
        }

        if !should_close {
            let mut state = self.lock_state();
            // Re-check under the lock so concurrent releases cannot overfill
            // the idle list.
            if !state.closed && state.idle.len() < self.inner.max_idle {
                state.idle.push_back(conn);
                return;
            }
        }

        self.close_quietly(&mut conn).await;
    }

    async fn close_quietly(&self, conn: &mut PooledConnection) {
        if let Err(err) = conn.close().await {
            tracing::debug!(id = conn.id(), error = %err, "error closing discarded connection");
        }
    }

    /// Close the pool: every idle connection is closed now, and checked-out
    /// connections are closed as they come back. Idempotent.
    pub async fn close(&self) {
        let drained = {
            let mut state = self.lock_state();
            state.closed = true;
            state.idle.drain(..).collect::<Vec<_>>()
        };
        for mut conn in drained {
            self.close_quietly(&mut conn).await;
        }
    }

    /// Number of idle connections currently retained.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.lock_state().idle.len()
    }

    /// Number of connections currently checked out.
    #[must_use]
    pub fn checked_out_count(&self) -> usize {
        self.lock_state().checked_out.len()
    }
}
