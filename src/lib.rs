//! Driver-agnostic SQL execution and result materialization.
//!
//! A [`Session`] holds one database connection in manual-commit mode together with a
//! cache of prepared statements. Queries come back as a [`ResultSet`] of [`Record`]s
//! whose values are one of four shapes ([`Value`]): null, number, text or bytes. Large
//! character and binary objects are streamed in and out through the same engine.
//!
//! Databases plug in through the traits in [`driver`]. The `sqlite` feature (on by
//! default) bundles a `SQLite` driver registered as `"sqlite"`.
//!
//! ```no_run
//! use sql_bridge::prelude::*;
//!
//! # fn main() -> Result<(), SqlBridgeError> {
//! let session = Session::open("sqlite", "sqlite::memory:", "", "")?;
//! session.update("CREATE TABLE t (id INTEGER, name TEXT)")?;
//! session.parameterized_update(
//!     "INSERT INTO t VALUES (?, ?)",
//!     &[BindValue::Int(1), BindValue::from("one")],
//!     false,
//! )?;
//! session.commit()?;
//! if let Some(rows) = session.query("SELECT id, name FROM t")? {
//!     assert_eq!(rows.len(), 1);
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod driver;
pub mod error;
pub mod lob;
pub mod prelude;
pub mod results;
pub mod session;
pub mod statement;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{ConnectOptions, ConnectOptionsBuilder};
pub use driver::{
    ColumnMeta, Cursor, Driver, DriverConnection, DriverStatement, lookup_driver,
    register_driver, registered_drivers,
};
pub use error::{DriverError, FieldDecodeWarning, LobKind, SqlBridgeError};
pub use results::{LiveCursor, Record, ResultSet};
pub use session::Session;
pub use statement::{StatementCache, StatementHandle, StatementLease};
pub use types::{BindValue, LobValue, SqlType, TypeFamily, Value};
