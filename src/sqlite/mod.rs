//! Reference [`DriverAdapter`] over `rusqlite`.
//!
//! SQLite has no session autocommit toggle of its own, so this adapter
//! emulates the DB-API convention: a session-level flag, a lazy `BEGIN`
//! issued before the first statement while the flag is off, and
//! `set_autocommit(true)` committing pending work.

mod params;

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;

use crate::dialect::Dialect;
use crate::driver::{DriverAdapter, QueryOutput, RawConnection};
use crate::error::SqlBridgeError;
use crate::types::SqlValue;

use params::{from_sqlite_value, to_sqlite_values};

/// Opens `rusqlite` connections for one database path.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: String,
    dialect: Dialect,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dialect: Dialect::sqlite(),
        }
    }

    /// A private in-memory database per connection.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// A shared-cache in-memory database, visible to every connection the
    /// pool opens (useful when multiple connections must see one dataset).
    #[must_use]
    pub fn shared_memory(name: &str) -> Self {
        Self::new(format!("file:{name}?mode=memory&cache=shared"))
    }
}

#[async_trait]
impl DriverAdapter for SqliteDriver {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn connect(&self) -> Result<Box<dyn RawConnection>, SqlBridgeError> {
        let conn = if self.path.starts_with("file:") {
            Connection::open_with_flags(
                &self.path,
                rusqlite::OpenFlags::default() | rusqlite::OpenFlags::SQLITE_OPEN_URI,
            )
        } else {
            Connection::open(&self.path)
        }
        .map_err(|err| SqlBridgeError::Connect {
            retryable: matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            message: err.to_string(),
        })?;
        Ok(Box::new(SqliteRawConnection {
            conn: Some(conn),
            autocommit: true,
        }))
    }
}

struct SqliteRawConnection {
    /// `None` once closed; dropping the handle closes the database.
    conn: Option<Connection>,
    /// Session-level autocommit flag (the lazy-BEGIN convention), distinct
    /// from `rusqlite`'s transaction-state view.
    autocommit: bool,
}

impl SqliteRawConnection {
    fn conn(&self) -> Result<&Connection, SqlBridgeError> {
        self.conn
            .as_ref()
            .ok_or_else(|| SqlBridgeError::Execution("connection is closed".into()))
    }
}

#[async_trait]
impl RawConnection for SqliteRawConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryOutput, SqlBridgeError> {
        let values = to_sqlite_values(params)?;
        let in_tx_needed = !self.autocommit;
        let conn = self.conn()?;

        // DB-API style implicit transactions: open one lazily before the
        // first statement while session autocommit is off.
        if in_tx_needed && conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }

        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            let affected = stmt.execute(rusqlite::params_from_iter(values))?;
            return Ok(QueryOutput::rows_affected_only(affected as u64));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let width = columns.len();
        let mut rows = stmt.query(rusqlite::params_from_iter(values))?;
        let mut buffered = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sqlite_value(row.get_ref(i)?)?);
            }
            buffered.push(values);
        }
        Ok(QueryOutput::buffered(Arc::new(columns), buffered))
    }

    async fn commit(&mut self) -> Result<(), SqlBridgeError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlBridgeError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), SqlBridgeError> {
        if enabled {
            let conn = self.conn()?;
            if !conn.is_autocommit() {
                conn.execute_batch("COMMIT")?;
            }
        }
        self.autocommit = enabled;
        Ok(())
    }

    fn can_disable_autocommit_now(&self) -> bool {
        true
    }

    fn non_idle_transaction_status(&self) -> Option<String> {
        match &self.conn {
            Some(conn) if !conn.is_autocommit() => Some("in transaction".to_string()),
            _ => None,
        }
    }

    async fn close(&mut self) -> Result<(), SqlBridgeError> {
        if let Some(conn) = self.conn.take()
            && let Err((conn, err)) = conn.close()
        {
            // Keep the handle so a retry is possible, and report the failure.
            self.conn = Some(conn);
            return Err(err.into());
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}
