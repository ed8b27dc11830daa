//! A database-access middle layer: one connection pool, one transaction
//! model, and one query binder across heterogeneous SQL backends.
//!
//! Backends plug in through the [`driver::DriverAdapter`] capability trait.
//! The [`pool::Pool`] manages reuse, bounded-retry connect, and release-time
//! validation; [`binder::bind`] parses `{...}` templates into a
//! backend-agnostic [`binder::BoundQuery`] rendered per [`dialect::Dialect`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_bridge::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlBridgeError> {
//! let pool = Pool::builder(Arc::new(SqliteDriver::in_memory())).build();
//! let mut conn = pool.scoped(AcquireOptions::default()).await?;
//! conn.execute(
//!     "CREATE TABLE foo (id {SERIAL PRIMARY KEY!t}, value INTEGER)",
//!     BindParams::None,
//! )
//! .await?;
//! let mut cursor = conn
//!     .execute("SELECT value FROM foo WHERE id = {id}", [("id", SqlValue::Int(1))])
//!     .await?;
//! while let Some(row) = cursor.next_row().await? {
//!     let _ = row.get("value");
//! }
//! conn.release().await;
//! # Ok(()) }
//! ```

pub mod binder;
pub mod cursor;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod row;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use binder::{BoundQuery, Segment, bind};
pub use cursor::Cursor;
pub use dialect::{Dialect, IdentifierQuoting, PlaceholderStyle};
pub use error::SqlBridgeError;
pub use pool::{AcquireOptions, Pool, PooledConnection, ScopedConnection};
pub use row::Row;
pub use types::{BindParams, DriverKind, SqlValue};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDriver;
