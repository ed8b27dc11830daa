use std::collections::BTreeMap;
use std::panic::Location;

use crate::binder::{BoundQuery, bind};
use crate::cursor::{Cursor, build_insert, build_select, build_update};
use crate::dialect::Dialect;
use crate::driver::RawConnection;
use crate::error::SqlBridgeError;
use crate::types::{BindParams, SqlValue};

/// Where a connection was last checked out, kept for release-time
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOrigin {
    file: &'static str,
    line: u32,
}

impl From<&'static Location<'static>> for AcquireOrigin {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl std::fmt::Display for AcquireOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Transaction mode layered over the raw autocommit flag.
///
/// `Soft` means autocommit was disabled on the caller's behalf and must be
/// restored on commit/rollback; `Explicit` means the backend could not toggle
/// autocommit, so a literal `BEGIN` was issued and there is nothing to
/// restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TxState {
    #[default]
    Idle,
    Soft {
        restore: bool,
    },
    Explicit,
}

/// One pooled backend connection with the transaction state machine on top.
///
/// Exclusively owned by whoever holds it; the pool guarantees at most one
/// concurrent owner by removing it from the idle list at acquisition time.
pub struct PooledConnection {
    raw: Box<dyn RawConnection>,
    id: u64,
    dialect: Dialect,
    tx_state: TxState,
    origin: Option<AcquireOrigin>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("tx_state", &self.tx_state)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub(crate) fn new(raw: Box<dyn RawConnection>, id: u64, dialect: Dialect) -> Self {
        Self {
            raw,
            id,
            dialect,
            tx_state: TxState::Idle,
            origin: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Where this connection was last acquired, if it has left the pool.
    #[must_use]
    pub fn origin(&self) -> Option<AcquireOrigin> {
        self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: AcquireOrigin) {
        self.origin = Some(origin);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }

    /// Current session autocommit flag.
    #[must_use]
    pub fn autocommit(&self) -> bool {
        self.raw.autocommit()
    }

    /// True while a soft transaction holds a saved autocommit value.
    #[must_use]
    pub fn in_soft_transaction(&self) -> bool {
        matches!(self.tx_state, TxState::Soft { .. })
    }

    /// Toggle session autocommit directly.
    ///
    /// # Errors
    /// [`SqlBridgeError::ProtocolState`] while a `begin()`-opened transaction
    /// is active (the toggle would clobber the saved autocommit slot), or a
    /// backend error applying the change.
    pub async fn set_autocommit(&mut self, enabled: bool) -> Result<(), SqlBridgeError> {
        if !matches!(self.tx_state, TxState::Idle) {
            return Err(SqlBridgeError::ProtocolState(
                "cannot change autocommit while a transaction is open".into(),
            ));
        }
        self.raw.set_autocommit(enabled).await
    }

    /// Enter a transaction. No-op when autocommit is already off — the caller
    /// simply continues in whatever transactional context exists.
    ///
    /// Prefers disabling autocommit (to be restored on commit/rollback) and
    /// falls back to an explicit `BEGIN` when the backend cannot toggle it.
    ///
    /// # Errors
    /// Propagates backend failures toggling autocommit or issuing `BEGIN`.
    pub async fn begin(&mut self) -> Result<(), SqlBridgeError> {
        if !self.raw.autocommit() {
            return Ok(());
        }
        if self.raw.can_disable_autocommit_now() {
            self.raw.set_autocommit(false).await?;
            self.tx_state = TxState::Soft { restore: true };
        } else {
            self.raw.execute("BEGIN", &[]).await?;
            self.tx_state = TxState::Explicit;
        }
        Ok(())
    }

    /// Commit the open transaction, restoring the pre-`begin()` autocommit
    /// state.
    ///
    /// # Errors
    /// [`SqlBridgeError::ProtocolState`] when the session is in pure
    /// autocommit mode with no transaction open.
    pub async fn commit(&mut self) -> Result<(), SqlBridgeError> {
        self.check_transactional("commit")?;
        self.raw.commit().await?;
        self.leave_transaction().await
    }

    /// Roll back the open transaction, restoring the pre-`begin()`
    /// autocommit state.
    ///
    /// # Errors
    /// [`SqlBridgeError::ProtocolState`] when the session is in pure
    /// autocommit mode with no transaction open.
    pub async fn rollback(&mut self) -> Result<(), SqlBridgeError> {
        self.check_transactional("rollback")?;
        self.raw.rollback().await?;
        self.leave_transaction().await
    }

    fn check_transactional(&self, verb: &str) -> Result<(), SqlBridgeError> {
        if matches!(self.tx_state, TxState::Idle) && self.raw.autocommit() {
            return Err(SqlBridgeError::ProtocolState(format!(
                "{verb} on a connection in autocommit mode with no open transaction"
            )));
        }
        Ok(())
    }

    async fn leave_transaction(&mut self) -> Result<(), SqlBridgeError> {
        if let TxState::Soft { restore } = self.tx_state {
            self.raw.set_autocommit(restore).await?;
        }
        self.tx_state = TxState::Idle;
        Ok(())
    }

    /// Close the connection. Idempotent; does not commit or roll back.
    ///
    /// # Errors
    /// Propagates the backend close failure.
    pub async fn close(&mut self) -> Result<(), SqlBridgeError> {
        if self.raw.is_closed() {
            return Ok(());
        }
        self.raw.close().await
    }

    /// Reset to a clean session baseline, as if freshly opened: clears any
    /// tracked transaction state and applies the requested autocommit flag.
    pub(crate) async fn reset_session(&mut self, autocommit: bool) -> Result<(), SqlBridgeError> {
        self.tx_state = TxState::Idle;
        if self.raw.autocommit() != autocommit {
            self.raw.set_autocommit(autocommit).await?;
        }
        Ok(())
    }

    /// Release-path cleanup: roll back whatever is pending and restore a
    /// saved autocommit value. Used by the pool before recycling.
    pub(crate) async fn rollback_for_recycle(&mut self) -> Result<(), SqlBridgeError> {
        self.raw.rollback().await?;
        self.leave_transaction().await
    }

    pub(crate) fn non_idle_transaction_status(&self) -> Option<String> {
        self.raw.non_idle_transaction_status()
    }

    pub(crate) fn must_discard_on_release(&self) -> bool {
        self.raw.must_discard_on_release()
    }

    /// Bind `template` against `params`, render for this backend's dialect,
    /// and execute.
    ///
    /// # Errors
    /// Binder errors propagate before any SQL reaches the backend; execution
    /// errors come from the adapter.
    pub async fn execute(
        &mut self,
        template: &str,
        params: impl Into<BindParams> + Send,
    ) -> Result<Cursor, SqlBridgeError> {
        let bound = bind(template, params)?;
        self.execute_bound(&bound).await
    }

    /// Execute an already-bound query.
    ///
    /// # Errors
    /// Propagates adapter execution failures.
    pub async fn execute_bound(&mut self, bound: &BoundQuery) -> Result<Cursor, SqlBridgeError> {
        let (sql, params) = bound.render(Some(&self.dialect));
        let output = self.raw.execute(&sql, &params).await?;
        Ok(Cursor::new(output))
    }

    /// INSERT one row; columns are sorted deterministically. With
    /// `returning`, reads back that single column from the inserted row.
    ///
    /// # Errors
    /// Propagates binder and execution failures; with `returning`, fails if
    /// the backend produced no row.
    pub async fn insert(
        &mut self,
        table: &str,
        data: &BTreeMap<String, SqlValue>,
        returning: Option<&str>,
    ) -> Result<Option<SqlValue>, SqlBridgeError> {
        let (template, params) = build_insert(table, data, returning);
        let mut cursor = self.execute(&template, params).await?;
        if returning.is_some() {
            let row = cursor.fetch_one().await?;
            return Ok(row.get_by_index(0).cloned());
        }
        Ok(None)
    }

    /// UPDATE with sorted SET pairs; WHERE params are appended after the SET
    /// params. Returns rows affected.
    ///
    /// # Errors
    /// Propagates binder and execution failures.
    pub async fn update(
        &mut self,
        table: &str,
        data: &BTreeMap<String, SqlValue>,
        where_clause: &str,
        where_params: &[SqlValue],
    ) -> Result<u64, SqlBridgeError> {
        let (template, params) = build_update(table, data, where_clause, where_params);
        let cursor = self.execute(&template, params).await?;
        Ok(cursor.rows_affected())
    }

    /// SELECT the given column expressions, optionally filtered.
    ///
    /// # Errors
    /// Propagates binder and execution failures.
    pub async fn select(
        &mut self,
        table: &str,
        columns: &[&str],
        where_clause: Option<&str>,
        where_params: &[SqlValue],
    ) -> Result<Cursor, SqlBridgeError> {
        let (template, params) = build_select(table, columns, where_clause, where_params);
        self.execute(&template, params).await
    }
}
