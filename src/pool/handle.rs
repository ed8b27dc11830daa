use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Pool, PooledConnection};

static LEAKED_DROPS: AtomicU64 = AtomicU64::new(0);

/// Guard around an acquired connection that returns it to the pool exactly
/// once, on every exit path.
///
/// The consuming [`release`](ScopedConnection::release) call is the
/// sanctioned mechanism. Dropping the guard without releasing still hands the
/// connection back by spawning the release on the current runtime, but that
/// path is best-effort and counted by [`leaked_drops`] as a diagnostic.
pub struct ScopedConnection {
    conn: Option<PooledConnection>,
    pool: Pool,
}

impl std::fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl ScopedConnection {
    pub(super) fn new(pool: Pool, conn: PooledConnection) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// Return the connection to the pool.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }

    /// Return the connection to the pool, forcing it closed.
    pub async fn release_and_close(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release_with(conn, true, true).await;
        }
    }

    /// Detach the connection from the guard; the caller now owns returning
    /// it via [`Pool::release`].
    #[must_use]
    pub fn into_inner(mut self) -> PooledConnection {
        match self.conn.take() {
            Some(conn) => conn,
            None => unreachable!("connection is present until a consuming call takes it"),
        }
    }

    /// Number of guards dropped without an explicit release since process
    /// start. Diagnostic only; never a correctness mechanism.
    #[must_use]
    pub fn leaked_drops() -> u64 {
        LEAKED_DROPS.load(Ordering::Relaxed)
    }
}

impl Deref for ScopedConnection {
    type Target = PooledConnection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is present until a consuming call takes it"),
        }
    }
}

impl DerefMut for ScopedConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is present until a consuming call takes it"),
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            LEAKED_DROPS.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                id = conn.id(),
                "scoped connection dropped without explicit release"
            );
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let pool = self.pool.clone();
                handle.spawn(async move {
                    pool.release(conn).await;
                });
            }
        }
    }
}
