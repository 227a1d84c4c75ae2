//! The driver seam.
//!
//! A driver opens connections; a connection prepares statements and controls the
//! transaction; a statement binds positional parameters and executes; a cursor walks
//! the rows of a query. Everything above this module talks to drivers only through
//! these traits, so the engine stays independent of any one database.
//!
//! Drivers are looked up by id in a process-wide registry. The bundled `SQLite` driver
//! is registered on first use; hosts add their own with [`register_driver`].

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::DriverError;
use crate::types::{BindValue, SqlType};

/// Name and declared type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Entry point of a database driver.
pub trait Driver: Send + Sync {
    /// Id used to select this driver in `Session::connect`.
    fn id(&self) -> &str;

    /// Open one physical connection.
    ///
    /// # Errors
    /// Returns `DriverError` on authentication failure, an unreachable endpoint or a
    /// URL this driver does not understand.
    fn connect(
        &self,
        url: &str,
        login: &str,
        password: &str,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// One live connection.
///
/// Implementations serialize access to the underlying connection themselves; the
/// engine never executes two statements on one connection at the same time on behalf
/// of one caller, but a host sharing a session across threads may.
pub trait DriverConnection: Send + Sync {
    /// Switch automatic commit on or off.
    ///
    /// # Errors
    /// Returns `DriverError` if the mode cannot be changed.
    fn set_auto_commit(&self, enabled: bool) -> Result<(), DriverError>;

    /// Prepare a statement for execution.
    ///
    /// # Errors
    /// Returns `DriverError` for malformed or unauthorized SQL.
    fn prepare(&self, sql: &str) -> Result<Box<dyn DriverStatement>, DriverError>;

    /// Execute a statement without parameters, returning rows affected.
    ///
    /// # Errors
    /// Returns `DriverError` if execution fails.
    fn execute_update(&self, sql: &str) -> Result<u64, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the commit fails.
    fn commit(&self) -> Result<(), DriverError>;

    /// # Errors
    /// Returns `DriverError` if the rollback fails.
    fn rollback(&self) -> Result<(), DriverError>;

    /// Close the connection. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns `DriverError` if the driver fails to release the connection.
    fn close(&self) -> Result<(), DriverError>;
}

/// A prepared statement. Not reentrant: one execution at a time.
pub trait DriverStatement: Send {
    /// Drop every parameter bound so far.
    fn clear_parameters(&mut self);

    /// Bind `value` at the 1-based `index`.
    ///
    /// # Errors
    /// Returns `DriverError` if the value cannot be bound.
    fn bind(&mut self, index: usize, value: &BindValue) -> Result<(), DriverError>;

    /// Bind a binary stream at the 1-based `index`. The reader is consumed before
    /// this call returns.
    ///
    /// # Errors
    /// Returns `DriverError` if the stream cannot be read or bound.
    fn bind_binary_stream(&mut self, index: usize, reader: &mut dyn Read)
    -> Result<(), DriverError>;

    /// Bind a character stream of exactly `length` characters at the 1-based `index`.
    /// The reader is consumed before this call returns.
    ///
    /// # Errors
    /// Returns `DriverError` if the stream cannot be read or bound, or holds fewer than
    /// `length` characters.
    fn bind_char_stream(
        &mut self,
        index: usize,
        reader: &mut dyn Read,
        length: usize,
    ) -> Result<(), DriverError>;

    /// Queue the currently bound parameters as one batch entry.
    ///
    /// # Errors
    /// Returns `DriverError` if the entry cannot be queued.
    fn add_batch(&mut self) -> Result<(), DriverError>;

    /// Execute every queued batch entry, returning one row count per entry. Negative
    /// counts mean the driver has no count for that entry.
    ///
    /// # Errors
    /// Returns `DriverError` if any entry fails.
    fn execute_batch(&mut self) -> Result<Vec<i64>, DriverError>;

    /// # Errors
    /// Returns `DriverError` if execution fails.
    fn execute_query(&mut self) -> Result<Box<dyn Cursor>, DriverError>;

    /// # Errors
    /// Returns `DriverError` if execution fails.
    fn execute_update(&mut self) -> Result<u64, DriverError>;

    /// Release the statement. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns `DriverError` if the driver fails to release the statement.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Row iterator over a query result. Column indexes are 0-based.
pub trait Cursor: Send {
    fn columns(&self) -> &[ColumnMeta];

    /// Advance to the next row; `false` once exhausted.
    ///
    /// # Errors
    /// Returns `DriverError` if the driver fails to fetch.
    fn next_row(&mut self) -> Result<bool, DriverError>;

    /// Default string conversion of the current row's value, `None` for SQL NULL.
    ///
    /// # Errors
    /// Returns `DriverError` for a bad index or a fetch failure.
    fn get_string(&mut self, index: usize) -> Result<Option<String>, DriverError>;

    /// Character stream over the current row's value, `None` for SQL NULL.
    ///
    /// # Errors
    /// Returns `DriverError` if the stream cannot be opened.
    fn char_stream(&mut self, index: usize) -> Result<Option<Box<dyn Read + '_>>, DriverError>;

    /// Binary stream over the current row's value, `None` for SQL NULL.
    ///
    /// # Errors
    /// Returns `DriverError` if the stream cannot be opened.
    fn binary_stream(&mut self, index: usize)
    -> Result<Option<Box<dyn Read + '_>>, DriverError>;

    /// # Errors
    /// Returns `DriverError` if the driver fails to release the cursor.
    fn close(&mut self) -> Result<(), DriverError>;
}

type DriverMap = HashMap<String, Arc<dyn Driver>>;

static DRIVERS: LazyLock<RwLock<DriverMap>> = LazyLock::new(|| {
    #[allow(unused_mut)]
    let mut drivers: DriverMap = HashMap::new();
    #[cfg(feature = "sqlite")]
    {
        let sqlite: Arc<dyn Driver> = Arc::new(crate::sqlite::SqliteDriver);
        drivers.insert(sqlite.id().to_string(), sqlite);
    }
    RwLock::new(drivers)
});

/// Register `driver` under its id, replacing any driver already registered there.
pub fn register_driver(driver: Arc<dyn Driver>) {
    let mut drivers = match DRIVERS.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    tracing::debug!(driver = driver.id(), "registering driver");
    drivers.insert(driver.id().to_string(), driver);
}

/// Look up a registered driver by id.
#[must_use]
pub fn lookup_driver(id: &str) -> Option<Arc<dyn Driver>> {
    let drivers = match DRIVERS.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    drivers.get(id).cloned()
}

/// Ids of every registered driver, sorted.
#[must_use]
pub fn registered_drivers() -> Vec<String> {
    let drivers = match DRIVERS.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let mut ids: Vec<String> = drivers.keys().cloned().collect();
    ids.sort();
    ids
}
