//! The capability surface a backend must expose to the pool and cursor layer.
//!
//! The core never links a driver library directly; it consumes these traits.
//! Anything a caller wants from a specific backend beyond this contract is
//! obtained from the backend crate itself, not through implicit delegation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::SqlBridgeError;
use crate::types::SqlValue;

/// A backend family adapter: opens raw connections and classifies connect
/// failures. Adapters own their connect parameters; the pool only asks for
/// new connections.
#[async_trait]
pub trait DriverAdapter: Send + Sync {
    /// Rendering policy for this backend family.
    fn dialect(&self) -> &Dialect;

    /// Open one raw connection.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::Connect`] (or a backend error) on failure.
    async fn connect(&self) -> Result<Box<dyn RawConnection>, SqlBridgeError>;

    /// Whether `err` is a transient connect failure worth retrying.
    fn is_retryable_connect_error(&self, err: &SqlBridgeError) -> bool {
        err.is_retryable_connect()
    }
}

/// One raw backend connection. Exclusively owned by a single caller while
/// checked out; none of these operations are safe to issue concurrently.
#[async_trait]
pub trait RawConnection: Send {
    /// Execute a statement with already-rendered SQL and ordered parameters.
    ///
    /// # Errors
    /// Returns an execution error from the backend.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryOutput, SqlBridgeError>;

    /// Commit the current transaction.
    ///
    /// # Errors
    /// Returns an execution error from the backend.
    async fn commit(&mut self) -> Result<(), SqlBridgeError>;

    /// Roll back the current transaction.
    ///
    /// # Errors
    /// Returns an execution error from the backend.
    async fn rollback(&mut self) -> Result<(), SqlBridgeError>;

    /// Current session autocommit flag.
    fn autocommit(&self) -> bool;

    /// Toggle session autocommit.
    ///
    /// # Errors
    /// Returns an execution error if the backend cannot apply the change.
    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), SqlBridgeError>;

    /// Whether autocommit can be disabled cheaply right now. When false, the
    /// transaction layer issues an explicit `BEGIN` instead.
    fn can_disable_autocommit_now(&self) -> bool;

    /// Non-empty when the connection sits in a non-idle transaction state;
    /// the pool warns and rolls back before recycling such a connection.
    fn non_idle_transaction_status(&self) -> Option<String>;

    /// True when the connection must be closed rather than recycled,
    /// regardless of pool capacity (e.g. unknown transaction status).
    fn must_discard_on_release(&self) -> bool {
        false
    }

    /// Close the connection. Idempotent.
    ///
    /// # Errors
    /// Returns an execution error from the backend.
    async fn close(&mut self) -> Result<(), SqlBridgeError>;

    /// Whether the connection has been closed (locally or by the backend).
    fn is_closed(&self) -> bool;
}

/// Result of one statement execution: column metadata, affected-row count,
/// and a forward-only row stream.
pub struct QueryOutput {
    /// Column names, shared with every row produced from this output.
    pub columns: Arc<Vec<String>>,
    /// Rows affected, for DML statements.
    pub rows_affected: u64,
    /// The row stream; empty for DML.
    pub rows: Box<dyn RowStream>,
}

impl std::fmt::Debug for QueryOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOutput")
            .field("columns", &self.columns)
            .field("rows_affected", &self.rows_affected)
            .finish_non_exhaustive()
    }
}

impl QueryOutput {
    /// An output with no columns and no rows (DML result).
    #[must_use]
    pub fn rows_affected_only(rows_affected: u64) -> Self {
        Self {
            columns: Arc::new(Vec::new()),
            rows_affected,
            rows: Box::new(BufferedRows::default()),
        }
    }

    /// An output backed by fully-buffered rows.
    #[must_use]
    pub fn buffered(columns: Arc<Vec<String>>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows_affected: 0,
            rows: Box::new(BufferedRows::new(rows)),
        }
    }
}

/// Forward-only, single-pass row source. Not restartable; adapters may buffer
/// internally (the SQLite adapter does) or stream from the wire.
#[async_trait]
pub trait RowStream: Send {
    /// Produce the next row's values, or `None` once exhausted.
    ///
    /// # Errors
    /// Returns an execution error if the backend fails mid-stream.
    async fn next_values(&mut self) -> Result<Option<Vec<SqlValue>>, SqlBridgeError>;
}

/// The trivial stream over pre-fetched rows.
#[derive(Debug, Default)]
pub struct BufferedRows {
    rows: std::collections::VecDeque<Vec<SqlValue>>,
}

impl BufferedRows {
    #[must_use]
    pub fn new(rows: Vec<Vec<SqlValue>>) -> Self {
        Self { rows: rows.into() }
    }
}

#[async_trait]
impl RowStream for BufferedRows {
    async fn next_values(&mut self) -> Result<Option<Vec<SqlValue>>, SqlBridgeError> {
        Ok(self.rows.pop_front())
    }
}
