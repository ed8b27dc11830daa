//! Convenient imports for common functionality.

pub use crate::binder::{BoundQuery, Segment, bind};
pub use crate::cursor::Cursor;
pub use crate::dialect::{Dialect, IdentifierQuoting, PlaceholderStyle};
pub use crate::driver::{DriverAdapter, QueryOutput, RawConnection, RowStream};
pub use crate::error::SqlBridgeError;
pub use crate::pool::{AcquireOptions, AcquireOrigin, Pool, PooledConnection, ScopedConnection};
pub use crate::row::Row;
pub use crate::types::{BindParams, DriverKind, SqlValue};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
