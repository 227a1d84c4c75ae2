//! Bundled `SQLite` driver, registered under the id `"sqlite"`.
//!
//! URLs take the form `sqlite:<path>[?mode=ro|rw|rwc&busy_timeout=<ms>&cache_capacity=<n>]`;
//! a leading `jdbc:` is accepted and `sqlite::memory:` opens an in-memory database.
//! Login and password are ignored.

pub mod config;
mod connection;
mod cursor;
mod params;
mod statement;

pub use config::{OpenMode, SqliteOptions, SqliteOptionsBuilder};
pub use connection::SqliteConnection;
pub use cursor::SqliteCursor;
pub use params::bind_value_to_sqlite;
pub use statement::SqliteStatement;

use tracing::debug;

use crate::driver::{Driver, DriverConnection};
use crate::error::DriverError;

/// Id of the bundled `SQLite` driver.
pub const SQLITE_DRIVER_ID: &str = "sqlite";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn id(&self) -> &str {
        SQLITE_DRIVER_ID
    }

    fn connect(
        &self,
        url: &str,
        _login: &str,
        _password: &str,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let opts = SqliteOptions::from_url(url)?;
        debug!(path = ?opts.db_path, mode = ?opts.mode, "opening sqlite database");
        let conn = opts.open()?;
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}
